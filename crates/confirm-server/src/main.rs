use clap::Parser;
use confirm_server::ServerBuilder;
use confirm_server::config::loader::{DEFAULT_PATH, load_config};

/// Confirmation service: invites, sign-up, password and PIN resets.
#[derive(Debug, Parser)]
#[command(name = "confirm-server", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIRM_CONFIG", default_value = DEFAULT_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    // .env is optional; only report files that exist but cannot be read.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    confirm_server::observability::init_tracing();

    let cli = Cli::parse();

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %cli.config, "Configuration loaded");
    confirm_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

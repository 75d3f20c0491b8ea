pub mod config;
pub mod engine;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;

pub use config::{AppConfig, ConfirmationsConfig, DirectoriesConfig, ServerConfig};
pub use engine::{Caller, Engine, EngineError, EngineSettings};
pub use observability::init_tracing;
pub use server::{AppState, ConfirmServer, ServerBuilder, build_app};

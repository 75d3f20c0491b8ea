use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router, error_handling::HandleErrorLayer, extract::DefaultBodyLimit, middleware,
    response::IntoResponse,
};
use confirm_api::ApiError;
use confirm_db_memory::InMemoryStore;
use confirm_db_postgres::PostgresStore;
use confirm_directory::{Directories, MemoryDirectory};
use confirm_notifications::{Dispatcher, Templates, build_mailer};
use confirm_storage::DynStore;
use tokio::task::JoinHandle;
use tower::{BoxError, ServiceBuilder, timeout::TimeoutLayer};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, DirectoryBackend, StorageBackend};
use crate::engine::{Engine, EngineSettings};
use crate::{middleware as app_middleware, routes};

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

pub struct ConfirmServer {
    addr: SocketAddr,
    app: Router,
    background: Vec<JoinHandle<()>>,
}

async fn handle_timeout(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Request deadline exceeded");
        ApiError::internal("request deadline exceeded")
    } else {
        ApiError::internal(err.to_string())
    }
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let timeout = Duration::from_millis(cfg.server.request_timeout_ms);

    routes::router(cfg.templates.preview)
        .with_state(state)
        // Outermost last: body limit, request id, trace, compression, cors, deadline
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        caller = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Connects the store, the directories and the mailer, then loads templates.
    pub async fn build(self) -> anyhow::Result<ConfirmServer> {
        let cfg = &self.config;
        let mut background = Vec::new();

        let store: DynStore = match cfg.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using the in-memory store; confirmations are lost on restart");
                Arc::new(InMemoryStore::new())
            }
            StorageBackend::Postgres => Arc::new(
                PostgresStore::new(&cfg.storage.postgres)
                    .await
                    .context("connecting to PostgreSQL")?,
            ),
        };

        let dirs = match cfg.directories.backend {
            DirectoryBackend::Memory => {
                tracing::warn!("Using in-memory directories");
                Directories::from_memory(&MemoryDirectory::new())
            }
            DirectoryBackend::Http => {
                let (dirs, token) = confirm_directory::http::build(&cfg.directories.http())
                    .context("building directory clients")?;
                background.push(token.spawn_refresh(Duration::from_secs(
                    cfg.directories.token_refresh_secs,
                )));
                dirs
            }
        };

        let templates = Templates::load(cfg.templates.path.clone(), &cfg.templates.default_language)
            .with_context(|| format!("loading templates from {}", cfg.templates.path.display()))?;
        tracing::info!(
            count = templates.current().len(),
            path = %cfg.templates.path.display(),
            "Templates loaded"
        );
        let mailer = build_mailer(&cfg.mail).context("configuring the mailer")?;
        let dispatcher = Dispatcher::new(Arc::new(templates), mailer);

        let engine = Engine::new(store, dirs, dispatcher, EngineSettings::from(cfg));
        let app = build_app(AppState::new(engine), cfg);

        Ok(ConfirmServer {
            addr: self.addr,
            app,
            background,
        })
    }
}

impl ConfirmServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        for task in &self.background {
            task.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use confirm_db_memory::InMemoryStore;
use confirm_directory::{Directories, MemoryDirectory, User};
use confirm_notifications::{Dispatcher, RecordingMailer, Templates};
use confirm_server::config::AppConfig;
use confirm_server::{AppState, Engine, EngineSettings, build_app};
use reqwest::RequestBuilder;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const SERVER_TOKEN: &str = "server-token";

/// A router served on an ephemeral port, with in-memory backends exposed
/// for seeding and inspection.
pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryStore>,
    pub dir: MemoryDirectory,
    pub mailer: Arc<RecordingMailer>,
    shutdown: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn template_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../templates")
}

pub async fn start_server() -> TestServer {
    start_server_with(AppConfig::default()).await
}

pub async fn start_server_with(mut config: AppConfig) -> TestServer {
    config.templates.path = template_dir();
    let store = Arc::new(InMemoryStore::new());
    let dir = MemoryDirectory::new();
    dir.add_server_session(SERVER_TOKEN, "peer-service");
    let mailer = Arc::new(RecordingMailer::new());
    let templates = Arc::new(
        Templates::load(template_dir(), &config.templates.default_language)
            .expect("load templates"),
    );

    let engine = Engine::new(
        store.clone(),
        Directories::from_memory(&dir),
        Dispatcher::new(templates, mailer.clone()),
        EngineSettings::from(&config),
    );
    let app = build_app(AppState::new(engine), &config);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        store,
        dir,
        mailer,
        shutdown: Some(tx),
        _handle: handle,
    }
}

impl TestServer {
    /// Seeds a user and a session token equal to `token_of(id)`.
    pub fn user(&self, id: &str, email: &str, roles: &[&str]) -> User {
        let user = User::new(id, email).with_roles(roles.iter().copied());
        self.add_user(user.clone());
        user
    }

    pub fn add_user(&self, user: User) {
        let id = user.user_id.clone();
        self.dir.add_user(user);
        self.dir.add_session(token_of(&id), id);
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(format!("{}{path}", self.base))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(format!("{}{path}", self.base))
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(format!("{}{path}", self.base))
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(format!("{}{path}", self.base))
    }
}

pub fn token_of(user_id: &str) -> String {
    format!("session-{user_id}")
}

/// Attaches the legacy session header for `user_id`.
pub trait AsUser {
    fn as_user(self, user_id: &str) -> Self;
    fn as_server(self) -> Self;
}

impl AsUser for RequestBuilder {
    fn as_user(self, user_id: &str) -> Self {
        self.header("x-tidepool-session-token", token_of(user_id))
    }

    fn as_server(self) -> Self {
        self.bearer_auth(SERVER_TOKEN)
    }
}

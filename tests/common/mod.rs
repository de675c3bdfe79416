//! Common test utilities shared across integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use laptop_catalog::auth::TokenManager;
use laptop_catalog::client::{self, AuthInterceptor, CatalogClient};
use laptop_catalog::server::{CatalogServer, CatalogState, ServerConfig};
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// Initialize test tracing (call once at the beginning of tests).
///
/// Only logs from the library are shown, filtering out HTTP/2 and tower noise.
/// Subsequent calls are safe and will be ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new("laptop_catalog=debug");

    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(filter)
        .try_init();
}

/// A catalog server running on an ephemeral port.
pub struct TestServer {
    pub url: String,
    pub catalog: CatalogState,
    pub tokens: Arc<TokenManager>,
    pub image_root: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Opens a new channel to the server.
    pub async fn channel(&self) -> Channel {
        Channel::from_shared(self.url.clone())
            .unwrap()
            .connect()
            .await
            .expect("Failed to connect to server")
    }

    /// Logs in as `username` and returns a client carrying the token.
    pub async fn client_as(&self, username: &str, password: &str) -> CatalogClient {
        let channel = self.channel().await;
        let token = client::login(channel.clone(), username, password)
            .await
            .expect("Login should succeed");
        CatalogClient::new(channel, AuthInterceptor::new(&token).unwrap())
    }

    /// Client sending no token.
    pub async fn anonymous_client(&self) -> CatalogClient {
        CatalogClient::new(self.channel().await, AuthInterceptor::anonymous())
    }

    /// Number of files in the image storage root.
    pub fn stored_images(&self) -> usize {
        count_files(self.image_root.path())
    }

    /// Stops the server and waits for in-flight calls to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

/// Starts a server with the default configuration.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(|_| {}).await
}

/// Starts a server after letting `configure` adjust the configuration.
pub async fn start_test_server_with(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let image_root = tempfile::tempdir().unwrap();

    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.storage.image_root = image_root.path().to_path_buf();
    configure(&mut config);

    let listener = tokio::net::TcpListener::bind(config.addr().unwrap())
        .await
        .unwrap();
    let local_addr = listener.local_addr().unwrap();

    let server = CatalogServer::from_config(config).unwrap();
    let catalog = server.catalog().clone();
    let tokens = server.auth().tokens.clone();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
            .unwrap();
    });

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    TestServer {
        url: format!("http://{local_addr}"),
        catalog,
        tokens,
        image_root,
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    }
}

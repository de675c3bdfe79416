use std::future::Future;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};
use tracing::info;

use crate::auth::AuthInterceptor;
use crate::proto::auth_service_server::AuthServiceServer;
use crate::proto::laptop_service_server::LaptopServiceServer;
use crate::store::ImageStore;
use crate::{Error, Result};

/// Server configuration.
pub mod config;

/// Shared stores and authentication state.
pub mod state;

/// Laptop catalog gRPC service.
pub mod laptop_service;

/// Login gRPC service.
pub mod auth_service;

pub use auth_service::AuthServiceImpl;
pub use config::ServerConfig;
pub use laptop_service::{spawn_search, LaptopServiceImpl, SearchTask};
pub use state::{AuthState, CatalogState};

/// Fully wired catalog server: stores, auth components and configuration.
pub struct CatalogServer {
    config: ServerConfig,
    catalog: CatalogState,
    auth: AuthState,
}

impl CatalogServer {
    /// Builds empty stores and enrolls the configured seed users.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let images = ImageStore::new(
            config.storage.image_root.clone(),
            config.storage.max_image_bytes,
        );
        let auth = AuthState::from_config(&config)?;

        Ok(Self {
            catalog: CatalogState::new(images),
            auth,
            config,
        })
    }

    /// Catalog stores served by this server.
    pub fn catalog(&self) -> &CatalogState {
        &self.catalog
    }

    /// Authentication components of this server.
    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Interceptor enforcing the configured access table.
    pub fn interceptor(&self) -> AuthInterceptor {
        self.auth.interceptor(&self.config)
    }

    /// Serves every catalog service on `listener` until `shutdown` resolves.
    ///
    /// The auth middleware wraps the whole router, health checks included.
    /// In-flight calls are allowed to finish after `shutdown` fires.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<AuthServiceServer<AuthServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<LaptopServiceServer<LaptopServiceImpl>>()
            .await;

        let mut builder = Server::builder();
        if self.config.tls.enabled {
            let cert = tokio::fs::read(&self.config.tls.cert_path).await?;
            let key = tokio::fs::read(&self.config.tls.key_path).await?;
            let identity = tonic::transport::Identity::from_pem(cert, key);

            builder = builder
                .tls_config(ServerTlsConfig::new().identity(identity))
                .map_err(|e| Error::Internal(format!("invalid TLS configuration: {e}")))?;
            info!("TLS enabled");
        }

        let interceptor = self.interceptor();
        let auth_service = AuthServiceImpl::new(
            self.auth.users.clone(),
            self.auth.tokens.clone(),
        );
        let laptop_service = LaptopServiceImpl::new(self.catalog, self.config.streams);

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "catalog server listening");
        }

        builder
            .layer(interceptor.layer())
            .add_service(health_service)
            .add_service(AuthServiceServer::new(auth_service))
            .add_service(LaptopServiceServer::new(laptop_service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.await;
                health_reporter
                    .set_not_serving::<LaptopServiceServer<LaptopServiceImpl>>()
                    .await;
                info!("Initiating graceful shutdown (allowing in-flight requests to complete)");
            })
            .await
            .map_err(|e| Error::Internal(format!("server error: {e}")))
    }
}

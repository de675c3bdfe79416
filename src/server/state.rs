use std::sync::Arc;

use crate::auth::{AuthInterceptor, TokenManager, UserDirectory};
use crate::store::{ImageStore, LaptopStore, RatingStore};

use super::config::ServerConfig;

/// Catalog stores shared by the laptop service.
///
/// Every field is a cheap handle; cloning the state shares the same stores.
#[derive(Clone)]
pub struct CatalogState {
    /// Laptops keyed by id.
    pub laptops: LaptopStore,
    /// Uploaded images.
    pub images: ImageStore,
    /// Rating aggregates keyed by laptop id.
    pub ratings: RatingStore,
}

impl CatalogState {
    /// Creates empty stores writing images under `images`.
    pub fn new(images: ImageStore) -> Self {
        Self {
            laptops: LaptopStore::new(),
            images,
            ratings: RatingStore::new(),
        }
    }
}

/// Authentication components shared by the auth service and the interceptor.
#[derive(Clone)]
pub struct AuthState {
    /// Enrolled identities.
    pub users: Arc<UserDirectory>,
    /// Token issuer and verifier.
    pub tokens: Arc<TokenManager>,
}

impl AuthState {
    /// Builds the token manager from `config` and enrolls its seed users.
    pub fn from_config(config: &ServerConfig) -> crate::Result<Self> {
        let tokens = TokenManager::new(&config.auth.secret_key, config.auth.token_ttl())
            .with_leeway(config.auth.clock_skew());

        let users = UserDirectory::new();
        for seed in &config.users {
            users.enroll(&seed.username, &seed.password, seed.role)?;
        }

        Ok(Self {
            users: Arc::new(users),
            tokens: Arc::new(tokens),
        })
    }

    /// Interceptor enforcing `config`'s access table with these tokens.
    pub fn interceptor(&self, config: &ServerConfig) -> AuthInterceptor {
        AuthInterceptor::new(
            Arc::clone(&self.tokens),
            Arc::new(config.access.build_policy()),
        )
    }
}

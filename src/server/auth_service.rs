use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use crate::auth::{TokenManager, UserDirectory};
use crate::proto::auth_service_server::AuthService;
use crate::proto::{LoginRequest, LoginResponse};
use crate::{Error, Result};

const MAX_USERNAME_LEN: usize = 256;

/// gRPC service exchanging a username/password pair for an access token.
pub struct AuthServiceImpl {
    users: Arc<UserDirectory>,
    tokens: Arc<TokenManager>,
}

impl AuthServiceImpl {
    /// Creates a new authentication service.
    pub fn new(users: Arc<UserDirectory>, tokens: Arc<TokenManager>) -> Self {
        Self { users, tokens }
    }

    async fn sign_in(&self, request: LoginRequest) -> Result<String> {
        if request.username.is_empty() {
            return Err(Error::InvalidArgument("username cannot be empty".to_string()));
        }

        if request.username.len() > MAX_USERNAME_LEN {
            return Err(Error::InvalidArgument("username too long".to_string()));
        }

        // Argon2 verification is CPU-bound.
        let users = Arc::clone(&self.users);
        let username = request.username.clone();
        let role = tokio::task::spawn_blocking(move || {
            users.authenticate(&username, &request.password)
        })
        .await
        .map_err(|e| Error::Internal(format!("credential check failed: {e}")))??;

        let token = self.tokens.issue(&request.username, role)?;
        info!(username = %request.username, %role, "issued access token");

        Ok(token)
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> std::result::Result<Response<LoginResponse>, Status> {
        let start = Instant::now();
        counter!("auth.login.requests").increment(1);

        let result = self.sign_in(request.into_inner()).await;

        histogram!("auth.login.duration").record(start.elapsed().as_secs_f64());

        match result {
            Ok(access_token) => {
                counter!("auth.login.success").increment(1);
                Ok(Response::new(LoginResponse { access_token }))
            }
            Err(e) => {
                counter!("auth.login.failure").increment(1);
                warn!(error = %e, "login rejected");
                Err(e.into())
            }
        }
    }
}

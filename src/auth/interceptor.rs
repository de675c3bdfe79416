use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::HeaderMap;
use metrics::counter;
use tonic::body::BoxBody;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::policy::{Access, AccessPolicy};
use super::token::{Claims, TokenManager};
use crate::{Error, Result};

/// Metadata key carrying the bearer token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

const BEARER_SCHEME: &str = "bearer";

/// Decides whether a call may proceed.
///
/// Holds only shared, immutable state: the token manager and the policy table.
#[derive(Clone, Debug)]
pub struct AuthInterceptor {
    tokens: Arc<TokenManager>,
    policy: Arc<AccessPolicy>,
}

impl AuthInterceptor {
    /// Creates an interceptor over the given token manager and policy.
    pub fn new(tokens: Arc<TokenManager>, policy: Arc<AccessPolicy>) -> Self {
        Self { tokens, policy }
    }

    /// Authorizes a call to `method` carrying `headers`.
    ///
    /// Returns `Ok(None)` for public methods, `Ok(Some(claims))` for an
    /// authorized caller, and `Unauthenticated`/`PermissionDenied` otherwise.
    /// Methods missing from the policy are denied.
    pub fn authorize(&self, headers: &HeaderMap, method: &str) -> Result<Option<Claims>> {
        let roles = match self.policy.lookup(method) {
            Some(Access::Public) => return Ok(None),
            Some(Access::Roles(roles)) => roles,
            None => {
                return Err(Error::PermissionDenied(format!(
                    "method {method} is not exposed"
                )))
            }
        };

        let token = bearer_token(headers)?;
        let claims = self.tokens.verify(token)?;

        if !roles.contains(&claims.role) {
            return Err(Error::PermissionDenied(format!(
                "role '{}' may not call {method}",
                claims.role
            )));
        }

        Ok(Some(claims))
    }

    /// Wraps this interceptor as a tower layer for the gRPC router.
    pub fn layer(&self) -> AuthLayer {
        AuthLayer {
            interceptor: self.clone(),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION_HEADER)
        .ok_or_else(|| Error::Unauthenticated("authorization token is not provided".to_string()))?;

    let value = value
        .to_str()
        .map_err(|_| Error::Unauthenticated("authorization header is not ASCII".to_string()))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| Error::Unauthenticated("expected 'Bearer <token>'".to_string()))?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) || token.is_empty() {
        return Err(Error::Unauthenticated(
            "expected 'Bearer <token>'".to_string(),
        ));
    }

    Ok(token)
}

/// Tower layer installing [`AuthMiddleware`] in front of every service.
#[derive(Clone, Debug)]
pub struct AuthLayer {
    interceptor: AuthInterceptor,
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            interceptor: self.interceptor.clone(),
        }
    }
}

/// Rejects unauthorized calls before they reach the wrapped router.
///
/// Streaming calls are checked once, when the request headers arrive, so a
/// rejected stream never reads or sends a message.
#[derive(Clone, Debug)]
pub struct AuthMiddleware<S> {
    inner: S,
    interceptor: AuthInterceptor,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AuthMiddleware<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<ReqBody>) -> Self::Future {
        let method = request.uri().path().to_string();

        match self.interceptor.authorize(request.headers(), &method) {
            Ok(claims) => {
                if let Some(claims) = claims {
                    debug!(method = %method, subject = %claims.sub, role = %claims.role, "call authorized");
                    request.extensions_mut().insert(claims);
                }
                Box::pin(self.inner.call(request))
            }
            Err(err) => {
                warn!(method = %method, error = %err, "call rejected");
                counter!("auth.rejected").increment(1);
                let response = Status::from(err).into_http();
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

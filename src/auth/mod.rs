//! Authentication and role-based access control.
//!
//! Tokens are issued by [`TokenManager`] after [`UserDirectory`] accepts a
//! username/password pair. Every inbound call then passes through
//! [`AuthInterceptor`], which checks the bearer token against the
//! [`AccessPolicy`] before the request reaches a handler.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Per-call authorization middleware.
pub mod interceptor;

/// Method → role table.
pub mod policy;

/// Signed, time-limited identity tokens.
pub mod token;

/// Enrolled identities and credential verification.
pub mod users;

pub use interceptor::{AuthInterceptor, AuthLayer, AuthMiddleware};
pub use policy::{Access, AccessPolicy};
pub use token::{Claims, TokenError, TokenManager};
pub use users::{Argon2Hasher, CredentialHasher, DirectoryError, Identity, UserDirectory};

/// Role claim carried by every token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including catalog mutation.
    Admin,
    /// Regular customer.
    User,
}

impl Role {
    /// Lowercase name used in tokens and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(crate::Error::InvalidArgument(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

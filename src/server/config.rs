use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::policy::methods;
use crate::auth::{AccessPolicy, Role};
use crate::store::image::DEFAULT_MAX_IMAGE_BYTES;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
    /// Token signing settings.
    pub auth: AuthSettings,
    /// Image storage settings.
    pub storage: StorageSettings,
    /// Streaming call limits.
    pub streams: StreamSettings,
    /// Method access table.
    pub access: AccessSettings,
    /// Identities enrolled at startup.
    pub users: Vec<SeedUser>,
    /// Metrics exporter configuration.
    pub metrics: MetricsSettings,
    /// TLS configuration.
    pub tls: TlsSettings,
}

impl ServerConfig {
    /// Converts host and port into a socket address.
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Token signing settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC signing key.
    pub secret_key: String,
    /// Lifetime of issued tokens, in seconds.
    pub token_ttl_secs: u64,
    /// Grace period accepted past token expiry, in seconds.
    pub clock_skew_secs: u64,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("secret_key", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("clock_skew_secs", &self.clock_skew_secs)
            .finish()
    }
}

impl AuthSettings {
    /// Token lifetime.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Accepted clock skew.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }
}

/// Image storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory receiving uploaded images.
    pub image_root: PathBuf,
    /// Largest accepted image, in bytes.
    pub max_image_bytes: usize,
}

/// Streaming call limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Longest a search may stream results, in seconds.
    pub search_deadline_secs: u64,
    /// Longest an image upload may take, in seconds.
    pub upload_deadline_secs: u64,
    /// Responses buffered per streaming call before back-pressure.
    pub buffer: usize,
}

impl StreamSettings {
    /// Search deadline.
    pub fn search_deadline(&self) -> Duration {
        Duration::from_secs(self.search_deadline_secs)
    }

    /// Upload deadline.
    pub fn upload_deadline(&self) -> Duration {
        Duration::from_secs(self.upload_deadline_secs)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            search_deadline_secs: 30,
            upload_deadline_secs: 60,
            buffer: 16,
        }
    }
}

/// Method access table.
///
/// Methods listed in neither `public` nor `roles` are denied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessSettings {
    /// Methods callable without a token.
    pub public: Vec<String>,
    /// Methods restricted to the listed roles.
    pub roles: BTreeMap<String, Vec<Role>>,
}

impl AccessSettings {
    /// Builds the policy table from these settings.
    pub fn build_policy(&self) -> AccessPolicy {
        let policy = self
            .public
            .iter()
            .fold(AccessPolicy::new(), |policy, method| {
                policy.allow_public(method.as_str())
            });

        self.roles.iter().fold(policy, |policy, (method, roles)| {
            policy.allow_roles(method.as_str(), roles.iter().copied())
        })
    }
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            public: vec![
                methods::LOGIN.to_string(),
                methods::SEARCH_LAPTOP.to_string(),
                methods::HEALTH_CHECK.to_string(),
                methods::HEALTH_WATCH.to_string(),
            ],
            roles: BTreeMap::from([
                (methods::CREATE_LAPTOP.to_string(), vec![Role::Admin]),
                (methods::UPLOAD_IMAGE.to_string(), vec![Role::Admin]),
                (methods::RATE_LAPTOP.to_string(), vec![Role::Admin, Role::User]),
            ]),
        }
    }
}

/// Identity enrolled at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct SeedUser {
    /// Username.
    pub username: String,
    /// Plain-text password, hashed on enrollment.
    pub password: String,
    /// Granted role.
    pub role: Role,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Metrics exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Whether metrics export is enabled.
    pub enabled: bool,
    /// Hostname or IP address for metrics server.
    pub host: String,
    /// Port number for metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// Converts host and port into a socket address for metrics server.
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// TLS configuration settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsSettings {
    /// Whether TLS is enabled.
    pub enabled: bool,
    /// Path to TLS certificate file (PEM format).
    pub cert_path: String,
    /// Path to TLS private key file (PEM format).
    pub key_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            auth: AuthSettings {
                secret_key: "secret".to_string(),
                token_ttl_secs: 15 * 60,
                clock_skew_secs: 0,
            },
            storage: StorageSettings {
                image_root: PathBuf::from("img"),
                max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            },
            streams: StreamSettings::default(),
            access: AccessSettings::default(),
            users: vec![
                SeedUser {
                    username: "admin1".to_string(),
                    password: "secret".to_string(),
                    role: Role::Admin,
                },
                SeedUser {
                    username: "user1".to_string(),
                    password: "secret".to_string(),
                    role: Role::User,
                },
            ],
            metrics: MetricsSettings {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
            tls: TlsSettings {
                enabled: false,
                cert_path: "cert/server-cert.pem".to_string(),
                key_path: "cert/server-key.pem".to_string(),
            },
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, `.env`, a TOML file and environment variables.
    ///
    /// Configuration priority (highest to lowest):
    /// 1. Environment variables with `SERVER_` prefix; nested keys are
    ///    separated by a double underscore (e.g. `SERVER_AUTH__SECRET_KEY`)
    /// 2. TOML configuration file (if exists)
    /// 3. Built-in defaults
    ///
    /// The `.env` file is loaded first so its variables take part in step 1.
    /// The TOML file path can be set via `SERVER_CONFIG_PATH`; it defaults to
    /// `config/server.toml` and is skipped when missing.
    ///
    /// # Environment Variable Examples
    /// ```bash
    /// SERVER_HOST=127.0.0.1
    /// SERVER_PORT=50051
    /// SERVER_AUTH__SECRET_KEY=change-me
    /// SERVER_AUTH__TOKEN_TTL_SECS=900
    /// SERVER_STORAGE__IMAGE_ROOT=/var/lib/catalog/img
    /// SERVER_TLS__ENABLED=true
    /// ```
    ///
    /// # Errors
    /// Returns an error if the configuration is malformed or contains invalid values.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> figment::error::Result<Self> {
        // Attempt to load .env file (silently ignore if it doesn't exist)
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("SERVER_CONFIG_PATH")
            .unwrap_or_else(|_| "config/server.toml".to_string());

        Self::figment(&config_path).extract()
    }

    /// Layered configuration sources, without `.env` handling.
    pub fn figment(config_path: &str) -> figment::Figment {
        use figment::providers::{Env, Format, Serialized, Toml};
        use figment::Figment;

        Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Toml::file(config_path))
            .merge(
                Env::prefixed("SERVER_")
                    .ignore(&["CONFIG_PATH"])
                    .split("__"),
            )
    }

    /// Validates the configuration for production readiness.
    ///
    /// # Errors
    /// Returns an error message if the configuration is invalid for production use.
    pub fn validate(&self) -> Result<(), String> {
        if self.addr().is_err() {
            return Err(format!(
                "Invalid listen address: {}:{}",
                self.host, self.port
            ));
        }

        if self.auth.secret_key.is_empty() {
            return Err("auth.secret_key cannot be empty".to_string());
        }

        if self.auth.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs cannot be zero".to_string());
        }

        if self.storage.max_image_bytes == 0 {
            return Err("storage.max_image_bytes cannot be zero".to_string());
        }

        if self.streams.buffer == 0 {
            return Err("streams.buffer cannot be zero".to_string());
        }

        if self.streams.search_deadline_secs == 0 || self.streams.upload_deadline_secs == 0 {
            return Err("stream deadlines cannot be zero".to_string());
        }

        if let Some((method, _)) = self.access.roles.iter().find(|(_, roles)| roles.is_empty()) {
            return Err(format!("access rule for {method} lists no roles"));
        }

        if let Some(method) = self
            .access
            .public
            .iter()
            .find(|method| self.access.roles.contains_key(method.as_str()))
        {
            return Err(format!(
                "{method} is listed both as public and under access.roles"
            ));
        }

        if self.tls.enabled {
            if self.tls.cert_path.is_empty() {
                return Err("TLS is enabled but cert_path is empty".to_string());
            }
            if self.tls.key_path.is_empty() {
                return Err("TLS is enabled but key_path is empty".to_string());
            }

            let cert_path = PathBuf::from(&self.tls.cert_path);
            if !cert_path.exists() {
                return Err(format!(
                    "TLS certificate file does not exist: {}",
                    self.tls.cert_path
                ));
            }

            let key_path = PathBuf::from(&self.tls.key_path);
            if !key_path.exists() {
                return Err(format!(
                    "TLS key file does not exist: {}",
                    self.tls.key_path
                ));
            }
        }

        Ok(())
    }
}

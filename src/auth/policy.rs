use std::collections::{BTreeSet, HashMap};

use super::Role;

/// Fully-qualified gRPC method paths known to the server.
pub mod methods {
    /// `AuthService/Login`.
    pub const LOGIN: &str = "/catalog.AuthService/Login";
    /// `LaptopService/CreateLaptop`.
    pub const CREATE_LAPTOP: &str = "/catalog.LaptopService/CreateLaptop";
    /// `LaptopService/SearchLaptop`.
    pub const SEARCH_LAPTOP: &str = "/catalog.LaptopService/SearchLaptop";
    /// `LaptopService/UploadImage`.
    pub const UPLOAD_IMAGE: &str = "/catalog.LaptopService/UploadImage";
    /// `LaptopService/RateLaptop`.
    pub const RATE_LAPTOP: &str = "/catalog.LaptopService/RateLaptop";
    /// gRPC health check.
    pub const HEALTH_CHECK: &str = "/grpc.health.v1.Health/Check";
    /// gRPC health watch.
    pub const HEALTH_WATCH: &str = "/grpc.health.v1.Health/Watch";
}

/// Who may call a method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// No token required.
    Public,
    /// A valid token carrying one of these roles.
    Roles(BTreeSet<Role>),
}

/// Static method → access table.
///
/// Methods absent from the table are denied to everyone.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    rules: HashMap<String, Access>,
}

impl AccessPolicy {
    /// Creates a policy that denies every method.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `method` as callable without a token.
    pub fn allow_public(mut self, method: impl Into<String>) -> Self {
        self.rules.insert(method.into(), Access::Public);
        self
    }

    /// Restricts `method` to callers holding one of `roles`.
    pub fn allow_roles(
        mut self,
        method: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
    ) -> Self {
        self.rules
            .insert(method.into(), Access::Roles(roles.into_iter().collect()));
        self
    }

    /// Returns the access rule for `method`, if any.
    pub fn lookup(&self, method: &str) -> Option<&Access> {
        self.rules.get(method)
    }

    /// Number of configured methods.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true when no method is configured.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Default table for the catalog server.
    pub fn catalog_defaults() -> Self {
        Self::new()
            .allow_public(methods::LOGIN)
            .allow_public(methods::SEARCH_LAPTOP)
            .allow_public(methods::HEALTH_CHECK)
            .allow_public(methods::HEALTH_WATCH)
            .allow_roles(methods::CREATE_LAPTOP, [Role::Admin])
            .allow_roles(methods::UPLOAD_IMAGE, [Role::Admin])
            .allow_roles(methods::RATE_LAPTOP, [Role::Admin, Role::User])
    }
}

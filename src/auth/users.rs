use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::RwLock;
use rand::RngCore;

use super::Role;
use crate::Error;

/// Slow, salted credential hashing.
///
/// Implementations must never compare secrets with plain equality.
pub trait CredentialHasher: Send + Sync {
    /// Hashes `credential` with a fresh salt.
    fn hash(&self, credential: &str) -> Result<String, DirectoryError>;

    /// Checks `credential` against a hash produced by [`CredentialHasher::hash`].
    fn verify(&self, credential: &str, hash: &str) -> bool;
}

/// Argon2id with default parameters, stored as a PHC string.
#[derive(Clone, Copy, Debug, Default)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, credential: &str) -> Result<String, DirectoryError> {
        let mut salt_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

        Argon2::default()
            .hash_password(credential.as_bytes(), &salt)
            .map(|phc| phc.to_string())
            .map_err(|e| DirectoryError::Hashing(e.to_string()))
    }

    fn verify(&self, credential: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(credential.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Enrolled identity.
#[derive(Clone, Debug)]
pub struct Identity {
    /// Unique username.
    pub subject: String,
    /// PHC-formatted credential hash.
    pub credential_hash: String,
    /// Role granted on login.
    pub role: Role,
}

/// User directory failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// No identity is enrolled under the subject.
    #[error("user '{0}' not found")]
    NotFound(String),

    /// The credential does not match the stored hash.
    #[error("incorrect credential")]
    BadCredential,

    /// The subject is already enrolled.
    #[error("user '{0}' already enrolled")]
    AlreadyExists(String),

    /// The credential could not be hashed.
    #[error("cannot hash credential: {0}")]
    Hashing(String),
}

impl From<DirectoryError> for Error {
    fn from(err: DirectoryError) -> Self {
        match err {
            // Unknown user and wrong password look the same to the caller.
            DirectoryError::NotFound(_) | DirectoryError::BadCredential => {
                Error::Unauthenticated("incorrect username or password".to_string())
            }
            DirectoryError::AlreadyExists(subject) => {
                Error::AlreadyExists(format!("user '{subject}' already enrolled"))
            }
            DirectoryError::Hashing(msg) => Error::Internal(msg),
        }
    }
}

/// Read-mostly table of enrolled identities.
pub struct UserDirectory {
    identities: RwLock<HashMap<String, Identity>>,
    hasher: Arc<dyn CredentialHasher>,
    // Verified against when the subject is unknown, so a miss costs as much
    // as a wrong password.
    decoy_hash: Option<String>,
}

impl UserDirectory {
    /// Creates an empty directory hashing credentials with Argon2.
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(Argon2Hasher))
    }

    /// Creates an empty directory using a custom hasher.
    pub fn with_hasher(hasher: Arc<dyn CredentialHasher>) -> Self {
        let mut decoy = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut decoy);
        let decoy_hash = hasher.hash(&URL_SAFE_NO_PAD.encode(decoy)).ok();

        Self {
            identities: RwLock::new(HashMap::new()),
            hasher,
            decoy_hash,
        }
    }

    /// Enrolls a new identity.
    ///
    /// The credential is hashed before the table lock is taken.
    pub fn enroll(&self, subject: &str, credential: &str, role: Role) -> Result<(), DirectoryError> {
        let credential_hash = self.hasher.hash(credential)?;

        let mut identities = self.identities.write();
        if identities.contains_key(subject) {
            return Err(DirectoryError::AlreadyExists(subject.to_string()));
        }

        identities.insert(
            subject.to_string(),
            Identity {
                subject: subject.to_string(),
                credential_hash,
                role,
            },
        );
        Ok(())
    }

    /// Verifies `credential` for `subject` and returns the enrolled role.
    ///
    /// An unknown subject still pays for one hash verification. This is
    /// CPU-heavy; async callers should run it on a blocking thread.
    pub fn authenticate(&self, subject: &str, credential: &str) -> Result<Role, DirectoryError> {
        let found = self
            .identities
            .read()
            .get(subject)
            .map(|identity| (identity.credential_hash.clone(), identity.role));

        let Some((hash, role)) = found else {
            if let Some(decoy) = &self.decoy_hash {
                self.hasher.verify(credential, decoy);
            }
            return Err(DirectoryError::NotFound(subject.to_string()));
        };

        if self.hasher.verify(credential, &hash) {
            Ok(role)
        } else {
            Err(DirectoryError::BadCredential)
        }
    }

    /// Returns the enrolled identity for `subject`.
    pub fn get(&self, subject: &str) -> Option<Identity> {
        self.identities.read().get(subject).cloned()
    }

    /// Number of enrolled identities.
    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    /// Returns true when nobody is enrolled.
    pub fn is_empty(&self) -> bool {
        self.identities.read().is_empty()
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn enrolled_user_authenticates_with_role() {
        let users = UserDirectory::new();
        users.enroll("admin1", "secret", Role::Admin).unwrap();

        assert_eq!(users.authenticate("admin1", "secret"), Ok(Role::Admin));
    }

    #[test]
    fn wrong_password_is_bad_credential() {
        let users = UserDirectory::new();
        users.enroll("user1", "secret", Role::User).unwrap();

        assert_eq!(
            users.authenticate("user1", "Secret"),
            Err(DirectoryError::BadCredential)
        );
    }

    #[test]
    fn unknown_user_is_not_found() {
        let users = UserDirectory::new();

        assert_eq!(
            users.authenticate("ghost", "secret"),
            Err(DirectoryError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn duplicate_enrollment_is_rejected() {
        let users = UserDirectory::new();
        users.enroll("user1", "secret", Role::User).unwrap();

        assert_eq!(
            users.enroll("user1", "other", Role::Admin),
            Err(DirectoryError::AlreadyExists("user1".to_string()))
        );
        assert_eq!(users.get("user1").unwrap().role, Role::User);
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn stored_hash_is_not_the_credential() {
        let users = UserDirectory::new();
        users.enroll("admin1", "secret", Role::Admin).unwrap();

        let identity = users.get("admin1").unwrap();
        assert_ne!(identity.credential_hash, "secret");
        assert!(identity.credential_hash.starts_with("$argon2"));
    }

    #[test]
    fn same_credential_gets_distinct_salts() {
        let hasher = Argon2Hasher;
        let first = hasher.hash("secret").unwrap();
        let second = hasher.hash("secret").unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("secret", &first));
        assert!(hasher.verify("secret", &second));
        assert!(!hasher.verify("secret", "not-a-phc-string"));
    }

    #[derive(Default)]
    struct CountingHasher {
        verifications: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, credential: &str) -> Result<String, DirectoryError> {
            Ok(format!("hashed:{credential}"))
        }

        fn verify(&self, credential: &str, hash: &str) -> bool {
            self.verifications.fetch_add(1, Ordering::SeqCst);
            hash == format!("hashed:{credential}")
        }
    }

    #[test]
    fn unknown_user_costs_one_verification() {
        let hasher = Arc::new(CountingHasher::default());
        let users = UserDirectory::with_hasher(hasher.clone());
        users.enroll("user1", "secret", Role::User).unwrap();

        assert_eq!(
            users.authenticate("user1", "wrong"),
            Err(DirectoryError::BadCredential)
        );
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 1);

        assert_eq!(
            users.authenticate("ghost", "wrong"),
            Err(DirectoryError::NotFound("ghost".to_string()))
        );
        assert_eq!(hasher.verifications.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn decoy_never_authenticates() {
        let users = UserDirectory::new();
        let decoy = users.decoy_hash.clone().unwrap();

        assert!(users.authenticate("ghost", &decoy).is_err());
        assert!(users.authenticate("ghost", "").is_err());
    }

    #[test]
    fn login_failures_hide_which_part_was_wrong() {
        let not_found = Error::from(DirectoryError::NotFound("ghost".into())).to_string();
        let bad = Error::from(DirectoryError::BadCredential).to_string();
        assert_eq!(not_found, bad);
    }
}

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::Role;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Verified token contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username) the token was issued to.
    pub sub: String,
    /// Role granted to the subject.
    pub role: Role,
    /// Issued-at, seconds since UNIX epoch.
    pub iat: u64,
    /// Expiry, seconds since UNIX epoch.
    pub exp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Token issuance and verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token is not a well-formed `header.claims.signature` triple.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The signature does not match the header and claims.
    #[error("token signature mismatch")]
    BadSignature,

    /// The token expiry has passed.
    #[error("token has expired")]
    Expired,

    /// The token could not be signed.
    #[error("cannot sign token: {0}")]
    Signing(String),
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Error::Internal(format!("cannot issue token: {msg}")),
            other => Error::Unauthenticated(format!("access token is invalid: {other}")),
        }
    }
}

/// Issues and verifies HMAC-SHA256 signed tokens (JWT compact form).
///
/// The manager holds only the signing key and timing settings, so a single
/// instance can be shared across any number of concurrent verifications.
#[derive(Clone)]
pub struct TokenManager {
    key: Vec<u8>,
    ttl: Duration,
    leeway: Duration,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("key", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl TokenManager {
    /// Creates a manager signing with `secret` and issuing tokens valid for `ttl`.
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
            ttl,
            leeway: Duration::ZERO,
        }
    }

    /// Allows tokens to be accepted up to `leeway` past their expiry.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Lifetime of tokens issued by [`TokenManager::issue`].
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `subject` with the configured lifetime.
    pub fn issue(&self, subject: &str, role: Role) -> Result<String, TokenError> {
        self.issue_at(subject, role, self.ttl, SystemTime::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(
        &self,
        subject: &str,
        role: Role,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<String, TokenError> {
        let iat = unix_seconds(now).map_err(TokenError::Signing)?;
        let claims = Claims {
            sub: subject.to_string(),
            role,
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
        };

        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let header = encode_segment(&header)?;
        let payload = encode_segment(&claims)?;
        let signature = self.sign(&header, &payload)?;

        Ok(format!(
            "{header}.{payload}.{}",
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verifies `token` against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, SystemTime::now())
    }

    /// Verifies `token` as if the current time were `now`.
    ///
    /// Expiry is checked before the signature: a token past its expiry is
    /// always `Expired`. The signature comparison runs in constant time.
    pub fn verify_at(&self, token: &str, now: SystemTime) -> Result<Claims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        let parsed: Header = decode_segment(header)?;
        if parsed.alg != ALGORITHM {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm '{}'",
                parsed.alg
            )));
        }

        let claims: Claims = decode_segment(payload)?;

        // A clock before the epoch cannot prove the token is still live.
        let now = unix_seconds(now).map_err(|_| TokenError::Expired)?;
        if now >= claims.exp.saturating_add(self.leeway.as_secs()) {
            return Err(TokenError::Expired);
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| TokenError::Malformed(format!("signature encoding: {e}")))?;
        let expected = self.sign(header, payload)?;

        if bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            Ok(claims)
        } else {
            Err(TokenError::BadSignature)
        }
    }

    fn sign(&self, header: &str, payload: &str) -> Result<Vec<u8>, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn unix_seconds(time: SystemTime) -> Result<u64, String> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Signing(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("segment encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed(format!("segment json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    fn manager() -> TokenManager {
        TokenManager::new("secret", FIFTEEN_MINUTES)
    }

    #[test]
    fn issued_token_verifies_with_same_claims() {
        let tokens = manager();
        let token = tokens.issue("admin1", Role::Admin).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin1");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.exp - claims.iat, FIFTEEN_MINUTES.as_secs());
    }

    #[test]
    fn token_expires_after_ttl() {
        let tokens = manager();
        let issued_at = SystemTime::now();
        let token = tokens
            .issue_at("user1", Role::User, FIFTEEN_MINUTES, issued_at)
            .unwrap();

        let just_before = issued_at + FIFTEEN_MINUTES - Duration::from_secs(1);
        assert!(tokens.verify_at(&token, just_before).is_ok());

        let after = issued_at + FIFTEEN_MINUTES + Duration::from_secs(1);
        assert_eq!(tokens.verify_at(&token, after), Err(TokenError::Expired));
    }

    #[test]
    fn leeway_extends_acceptance_window() {
        let tokens = manager().with_leeway(Duration::from_secs(30));
        let issued_at = SystemTime::now();
        let token = tokens
            .issue_at("user1", Role::User, FIFTEEN_MINUTES, issued_at)
            .unwrap();

        let within_leeway = issued_at + FIFTEEN_MINUTES + Duration::from_secs(10);
        assert!(tokens.verify_at(&token, within_leeway).is_ok());

        let past_leeway = issued_at + FIFTEEN_MINUTES + Duration::from_secs(31);
        assert_eq!(
            tokens.verify_at(&token, past_leeway),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn tampered_claims_fail_signature_check() {
        let tokens = manager();
        let token = tokens.issue("user1", Role::User).unwrap();
        let segments: Vec<&str> = token.split('.').collect();

        let claims: Claims = decode_segment(segments[1]).unwrap();
        let forged = Claims {
            role: Role::Admin,
            ..claims
        };
        let forged_payload = encode_segment(&forged).unwrap();
        let forged_token = format!("{}.{}.{}", segments[0], forged_payload, segments[2]);

        assert_eq!(tokens.verify(&forged_token), Err(TokenError::BadSignature));
    }

    #[test]
    fn token_from_other_key_is_rejected() {
        let issuer = TokenManager::new("other-secret", FIFTEEN_MINUTES);
        let token = issuer.issue("admin1", Role::Admin).unwrap();

        assert_eq!(manager().verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let tokens = manager();
        for input in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(
                matches!(tokens.verify(input), Err(TokenError::Malformed(_))),
                "input {input:?} should be malformed"
            );
        }
    }

    #[test]
    fn unsupported_algorithm_is_malformed() {
        let tokens = manager();
        let token = tokens.issue("admin1", Role::Admin).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        let header = encode_segment(&Header {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })
        .unwrap();
        let forged = format!("{header}.{}.", segments[1]);

        assert!(matches!(
            tokens.verify(&forged),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn token_error_maps_to_unauthenticated() {
        assert!(matches!(
            Error::from(TokenError::Expired),
            Error::Unauthenticated(_)
        ));
        assert!(matches!(
            Error::from(TokenError::Signing("boom".into())),
            Error::Internal(_)
        ));
    }
}

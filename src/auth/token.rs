//! Access token signing and refresh secret minting.
//!
//! Access tokens are HS256 JWTs carrying the claims in
//! [`AccessClaims`](crate::auth::models::AccessClaims). Refresh secrets are
//! opaque random strings; only their SHA-256 digest is ever persisted.

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use tracing::warn;
use uuid::Uuid;

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::models::{AccessClaims, User};

const REFRESH_SECRET_BYTES: usize = 40;
const FALLBACK_TTL_SECONDS: i64 = 30 * 86_400;

static DURATION_RE: OnceLock<Regex> = OnceLock::new();

fn duration_re() -> &'static Regex {
    DURATION_RE.get_or_init(|| {
        Regex::new(r"^(\d+)([smhd])$").expect("duration pattern compiles")
    })
}

/// Parse a compact duration such as `15m` or `30d` into seconds.
fn ttl_seconds(spec: &str) -> Option<i64> {
    let captures = duration_re().captures(spec.trim())?;
    let value: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = match captures.get(2)?.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };
    value.checked_mul(unit)
}

fn ttl_or_fallback(spec: &str, what: &str) -> i64 {
    ttl_seconds(spec).unwrap_or_else(|| {
        warn!("invalid {what} duration {spec:?}, falling back to 30d");
        FALLBACK_TTL_SECONDS
    })
}

/// A freshly signed access token together with its claims.
#[derive(Debug, Clone)]
pub struct IssuedAccess {
    pub token: String,
    pub claims: AccessClaims,
}

/// Access and refresh credentials issued together. The refresh secret is
/// raw; it leaves the process only inside the session cookie.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedAccess,
    pub refresh_secret: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Signs and verifies access tokens, mints refresh secrets.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenCodec {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.token_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: ttl_or_fallback(config.access_ttl(), "access token"),
            refresh_ttl: ttl_or_fallback(config.refresh_ttl(), "refresh token"),
        }
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl
    }

    #[must_use]
    pub fn refresh_expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.refresh_ttl)
    }

    /// Sign an access token for `user` with a fresh `jti`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` when signing fails.
    pub fn issue_access(
        &self,
        user: &User,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<IssuedAccess, AuthError> {
        let iat = now.timestamp();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            permissions,
            jti: Uuid::new_v4(),
            iat,
            exp: iat + self.access_ttl,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| anyhow!(err).context("failed to sign access token"))?;
        Ok(IssuedAccess { token, claims })
    }

    /// Verify signature and expiry of an access token.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenExpired` for tokens past their `exp`, otherwise
    /// `AuthError::InvalidToken` for anything that fails validation.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Mint an opaque refresh secret from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` when the entropy source fails.
    pub fn mint_refresh_secret(&self) -> Result<String, AuthError> {
        let mut bytes = [0_u8; REFRESH_SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| anyhow!(err).context("failed to read entropy for refresh secret"))?;
        Ok(hex::encode(bytes))
    }

    /// Digest used to look up and persist a refresh secret.
    #[must_use]
    pub fn hash_secret(secret: &str) -> String {
        hex::encode(Sha256::digest(secret.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn codec() -> TokenCodec {
        TokenCodec::new(&AuthConfig::new(SecretString::from(
            "unit-test-secret".to_string(),
        )))
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "codec@example.com".to_string(),
            password_hash: String::new(),
            role: "user".to_string(),
            status: "active".to_string(),
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn parses_compact_durations() {
        assert_eq!(ttl_seconds("45s"), Some(45));
        assert_eq!(ttl_seconds("15m"), Some(900));
        assert_eq!(ttl_seconds("12h"), Some(43_200));
        assert_eq!(ttl_seconds("30d"), Some(2_592_000));
        assert_eq!(ttl_seconds(" 5m "), Some(300));
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "15", "m15", "15 m", "15w", "-5m", "1.5h", "15mm"] {
            assert_eq!(ttl_seconds(bad), None, "{bad:?} should not parse");
        }
    }

    #[test]
    fn unparseable_ttl_falls_back_to_thirty_days() {
        let config = AuthConfig::new(SecretString::from("secret".to_string()))
            .with_access_ttl("soon".to_string())
            .with_refresh_ttl("later".to_string());
        let codec = TokenCodec::new(&config);
        assert_eq!(codec.access_ttl_seconds(), FALLBACK_TTL_SECONDS);
        assert_eq!(codec.refresh_ttl_seconds(), FALLBACK_TTL_SECONDS);
    }

    #[test]
    fn issued_access_tokens_verify_round_trip() {
        let codec = codec();
        let user = user();
        let issued = codec
            .issue_access(&user, vec!["users:read".to_string()], Utc::now())
            .expect("signing should succeed");

        let claims = codec
            .verify_access(&issued.token)
            .expect("fresh token should verify");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.jti, issued.claims.jti);
        assert_eq!(claims.permissions, vec!["users:read".to_string()]);
        assert_eq!(claims.exp - claims.iat, codec.access_ttl_seconds());
    }

    #[test]
    fn expired_tokens_map_to_token_expired() {
        let codec = codec();
        let user = user();
        // Beyond the default validation leeway.
        let stale = Utc::now() - Duration::hours(2);
        let issued = codec
            .issue_access(&user, Vec::new(), stale)
            .expect("signing should succeed");

        let err = codec
            .verify_access(&issued.token)
            .expect_err("stale token must not verify");
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn tampered_tokens_map_to_invalid_token() {
        let codec = codec();
        let issued = codec
            .issue_access(&user(), Vec::new(), Utc::now())
            .expect("signing should succeed");

        let mut tampered = issued.token;
        tampered.pop();
        tampered.push('A');
        assert!(matches!(
            codec.verify_access(&tampered),
            Err(AuthError::InvalidToken)
        ));

        let other = TokenCodec::new(&AuthConfig::new(SecretString::from(
            "a-different-secret".to_string(),
        )));
        let foreign = other
            .issue_access(&user(), Vec::new(), Utc::now())
            .expect("signing should succeed");
        assert!(matches!(
            codec.verify_access(&foreign.token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn refresh_secrets_are_eighty_hex_chars_and_unique() {
        let codec = codec();
        let first = codec.mint_refresh_secret().expect("entropy available");
        let second = codec.mint_refresh_secret().expect("entropy available");
        assert_eq!(first.len(), REFRESH_SECRET_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn secret_hash_is_a_stable_sha256_digest() {
        let digest = TokenCodec::hash_secret("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest, TokenCodec::hash_secret("abc"));
    }
}

//! Engine configuration with production defaults.

use secrecy::SecretString;

const DEFAULT_ACCESS_TTL: &str = "15m";
const DEFAULT_REFRESH_TTL: &str = "30d";
const DEFAULT_MAX_LOGIN_ATTEMPTS: i32 = 5;
const DEFAULT_ATTEMPT_WINDOW_MINUTES: i64 = 15;
const DEFAULT_LOCK_DURATION_MINUTES: i64 = 30;
const DEFAULT_REFRESH_LOCK_TIMEOUT_MS: u64 = 2000;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_secret: SecretString,
    access_ttl: String,
    refresh_ttl: String,
    max_login_attempts: i32,
    attempt_window_minutes: i64,
    lock_duration_minutes: i64,
    refresh_lock_timeout_ms: u64,
    revocation_fail_open: bool,
    secure_cookies: bool,
    frontend_origin: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(token_secret: SecretString) -> Self {
        Self {
            token_secret,
            access_ttl: DEFAULT_ACCESS_TTL.to_string(),
            refresh_ttl: DEFAULT_REFRESH_TTL.to_string(),
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            attempt_window_minutes: DEFAULT_ATTEMPT_WINDOW_MINUTES,
            lock_duration_minutes: DEFAULT_LOCK_DURATION_MINUTES,
            refresh_lock_timeout_ms: DEFAULT_REFRESH_LOCK_TIMEOUT_MS,
            revocation_fail_open: false,
            secure_cookies: true,
            frontend_origin: None,
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: String) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: String) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: i32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_attempt_window_minutes(mut self, minutes: i64) -> Self {
        self.attempt_window_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_lock_duration_minutes(mut self, minutes: i64) -> Self {
        self.lock_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_lock_timeout_ms(mut self, millis: u64) -> Self {
        self.refresh_lock_timeout_ms = millis;
        self
    }

    /// Treat an unreachable durable revocation store as "not revoked".
    /// Development convenience only; never enable in production.
    #[must_use]
    pub fn with_revocation_fail_open(mut self, fail_open: bool) -> Self {
        self.revocation_fail_open = fail_open;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_frontend_origin(mut self, origin: Option<String>) -> Self {
        self.frontend_origin = origin;
        self
    }

    pub(crate) fn token_secret(&self) -> &SecretString {
        &self.token_secret
    }

    #[must_use]
    pub fn access_ttl(&self) -> &str {
        &self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> &str {
        &self.refresh_ttl
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> i32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn attempt_window_minutes(&self) -> i64 {
        self.attempt_window_minutes
    }

    #[must_use]
    pub fn lock_duration_minutes(&self) -> i64 {
        self.lock_duration_minutes
    }

    #[must_use]
    pub fn refresh_lock_timeout_ms(&self) -> u64 {
        self.refresh_lock_timeout_ms
    }

    #[must_use]
    pub fn revocation_fail_open(&self) -> bool {
        self.revocation_fail_open
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    #[must_use]
    pub fn frontend_origin(&self) -> Option<&str> {
        self.frontend_origin.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("test-secret".to_string())
    }

    #[test]
    fn defaults_match_production_settings() {
        let config = AuthConfig::new(secret());

        assert_eq!(config.access_ttl(), DEFAULT_ACCESS_TTL);
        assert_eq!(config.refresh_ttl(), DEFAULT_REFRESH_TTL);
        assert_eq!(config.max_login_attempts(), DEFAULT_MAX_LOGIN_ATTEMPTS);
        assert_eq!(
            config.attempt_window_minutes(),
            DEFAULT_ATTEMPT_WINDOW_MINUTES
        );
        assert_eq!(
            config.lock_duration_minutes(),
            DEFAULT_LOCK_DURATION_MINUTES
        );
        assert_eq!(
            config.refresh_lock_timeout_ms(),
            DEFAULT_REFRESH_LOCK_TIMEOUT_MS
        );
        assert!(!config.revocation_fail_open());
        assert!(config.secure_cookies());
        assert_eq!(config.frontend_origin(), None);
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new(secret())
            .with_access_ttl("5m".to_string())
            .with_refresh_ttl("7d".to_string())
            .with_max_login_attempts(3)
            .with_attempt_window_minutes(10)
            .with_lock_duration_minutes(60)
            .with_refresh_lock_timeout_ms(500)
            .with_revocation_fail_open(true)
            .with_secure_cookies(false)
            .with_frontend_origin(Some("https://app.sesio.dev".to_string()));

        assert_eq!(config.access_ttl(), "5m");
        assert_eq!(config.refresh_ttl(), "7d");
        assert_eq!(config.max_login_attempts(), 3);
        assert_eq!(config.attempt_window_minutes(), 10);
        assert_eq!(config.lock_duration_minutes(), 60);
        assert_eq!(config.refresh_lock_timeout_ms(), 500);
        assert!(config.revocation_fail_open());
        assert!(!config.secure_cookies());
        assert_eq!(config.frontend_origin(), Some("https://app.sesio.dev"));
    }
}

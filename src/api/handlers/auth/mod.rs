//! HTTP surface for the session lifecycle: login, refresh, logout,
//! password change, and session management.

pub mod history;
pub mod login;
pub mod logout;
pub mod password;
pub mod principal;
pub mod refresh;
pub mod sessions;
pub mod types;
pub mod utils;

use crate::auth::{AuthConfig, SessionFlows};

/// Shared handler state, wired once at startup and passed via `Extension`.
pub struct AuthState {
    flows: SessionFlows,
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(flows: SessionFlows, config: AuthConfig) -> Self {
        Self { flows, config }
    }

    #[must_use]
    pub fn flows(&self) -> &SessionFlows {
        &self.flows
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

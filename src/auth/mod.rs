pub mod attempts;
pub mod audit;
pub mod config;
pub mod error;
pub mod lockout;
pub mod models;
pub mod password;
pub mod permissions;
pub mod refresh;
pub mod revocation;
pub mod rotation;
pub mod service;
pub mod token;
pub mod users;

pub use config::AuthConfig;
pub use error::AuthError;
pub use service::{ClientMeta, SessionFlows};

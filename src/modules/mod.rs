pub mod config;
pub mod logger;
pub mod oauth;

pub use config::load_relay_config;
pub use oauth::{AccessToken, GoogleCredentials, TokenSource};

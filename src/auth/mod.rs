//! OAuth2 token lifecycle for the Mercedes-Benz identity service
//!
//! Implements the authorization-code grant (interactive browser consent) and
//! the refresh-token grant, with the credential persisted across restarts.

pub mod credential;
pub mod error;
pub mod flow;
pub mod manager;
pub mod store;

pub use credential::Credential;
pub use error::AuthError;
pub use flow::AuthorizationFlow;
pub use manager::TokenManager;
pub use store::TokenStore;

use anyhow::{Context, Result};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};

use crate::config::Config;

/// Scopes requested at consent time. `offline_access` yields the refresh
/// token; the rest gate the vehicle data containers.
pub const SCOPES: &[&str] = &[
    "offline_access",
    "mb:vehicle:mbdata:evstatus",
    "mb:vehicle:mbdata:fuelstatus",
    "mb:vehicle:mbdata:payasyoudrive",
    "mb:vehicle:mbdata:vehiclelock",
    "mb:vehicle:mbdata:vehiclestatus",
];

/// Build the OAuth2 client from the loaded configuration.
pub fn build_oauth_client(config: &Config) -> Result<BasicClient> {
    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        Some(ClientSecret::new(config.client_secret.clone())),
        AuthUrl::new(config.auth_url.clone()).context("Invalid authorization URL")?,
        Some(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?),
    )
    .set_redirect_uri(
        RedirectUrl::new(config.redirect_url.clone()).context("Invalid redirect URL")?,
    ))
}

/// The requested scope set as `oauth2` values.
pub fn requested_scopes() -> Vec<Scope> {
    SCOPES.iter().map(|s| Scope::new((*s).to_string())).collect()
}

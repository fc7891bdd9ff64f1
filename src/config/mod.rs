//! Configuration loading
//!
//! One TOML file read at startup; everything in it is immutable afterwards.
//! Vendor endpoints are overridable mainly so tests can point the exporter at
//! a local stand-in.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    /// OAuth2 client id issued by the Mercedes-Benz developer portal
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Vehicle identification number to export metrics for
    pub vin: String,
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Redirect URL registered for the OAuth2 client
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    /// Vendor consent page
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Vendor token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Vehicle data API base
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Credential state file location (defaults to the config directory)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_redirect_url() -> String {
    "http://localhost:8080/oauth.redirect".to_string()
}

fn default_auth_url() -> String {
    "https://id.mercedes-benz.com/as/authorization.oauth2".to_string()
}

fn default_token_url() -> String {
    "https://id.mercedes-benz.com/as/token.oauth2".to_string()
}

fn default_api_base_url() -> String {
    "https://api.mercedes-benz.com".to_string()
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "mb-exporter", "mb-exporter")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Load configuration, from an explicit path or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_dir()?.join("config.toml"),
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Where the credential state lives.
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("state.json")),
        }
    }
}

//! Authenticated HTTP client for the vehicle data API
//!
//! Every request obtains its bearer token from the token manager. A 401
//! despite a locally-valid token forces one refresh-and-retry, covering clock
//! skew and early revocation the local expiry tracking cannot see.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthError, TokenManager};

/// Bound on any single vehicle data request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One resource sample as the vendor reports it: a stringly-typed value and
/// a millisecond measurement timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct Reading {
    pub value: String,
    pub timestamp: i64,
}

/// What a container query produced.
#[derive(Debug)]
pub enum ContainerData {
    /// Fresh samples, keyed by resource name.
    Readings(Vec<HashMap<String, Reading>>),
    /// 204: the vehicle reported nothing new.
    NoContent,
    /// 429: over the vendor rate limit, keep the previous samples.
    RateLimited,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },
    #[error("unexpected response body from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
    #[error("HTTP {status} for {url}: {body}")]
    Unexpected { url: String, status: u16, body: String },
}

/// Authenticated client for the vehicle data containers.
pub struct VehicleClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    base_url: String,
    vin: String,
}

impl VehicleClient {
    pub fn new(tokens: Arc<TokenManager>, base_url: String, vin: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json;charset=utf-8"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            vin,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    /// Query one vehicle data container.
    pub async fn fetch_container(&self, container: &str) -> Result<ContainerData, ApiError> {
        let url = format!(
            "{}/vehicledata/v2/vehicles/{}/containers/{}",
            self.base_url, self.vin, container
        );

        let token = self.tokens.get_valid_token().await?;
        let mut resp = self.get(&url, &token).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // Token looked valid locally but the API disagrees; refresh once
            // and retry, never more than once per request.
            tracing::info!("401 from vehicle API despite valid token, forcing refresh");
            let token = self.tokens.refresh_and_get().await?;
            resp = self.get(&url, &token).await?;
        }

        match resp.status() {
            StatusCode::OK => {
                let readings = resp.json().await.map_err(|source| ApiError::Decode {
                    url: url.clone(),
                    source,
                })?;
                Ok(ContainerData::Readings(readings))
            }
            StatusCode::NO_CONTENT => Ok(ContainerData::NoContent),
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::debug!("Rate limited on container {}", container);
                Ok(ContainerData::RateLimited)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ApiError::Unexpected {
                    url,
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn get(&self, url: &str, token: &str) -> Result<reqwest::Response, ApiError> {
        tracing::debug!("GET {}", url);
        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                url: url.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use oauth2::basic::BasicClient;
    use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, Scope, TokenUrl};
    use serde_json::json;
    use wiremock::matchers::{bearer_token, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VIN: &str = "WDB1234561Z000999";

    fn client_with(server: &MockServer, dir: &tempfile::TempDir, access_token: &str) -> VehicleClient {
        let oauth = BasicClient::new(
            ClientId::new("client-id".to_string()),
            Some(ClientSecret::new("client-secret".to_string())),
            AuthUrl::new(format!("{}/authorize", server.uri())).unwrap(),
            Some(TokenUrl::new(format!("{}/token", server.uri())).unwrap()),
        )
        .set_redirect_uri(
            RedirectUrl::new("http://localhost:8080/oauth.redirect".to_string()).unwrap(),
        );
        let store = TokenStore::new(dir.path().join("state.json"));
        store
            .save(&crate::auth::Credential {
                access_token: access_token.to_string(),
                refresh_token: Some("refresh".to_string()),
                expires_at: Some(Utc::now() + ChronoDuration::seconds(3600)),
                scope: vec![],
            })
            .unwrap();
        let tokens = Arc::new(TokenManager::new(
            oauth,
            store,
            vec![Scope::new("offline_access".to_string())],
        ));
        VehicleClient::new(tokens, server.uri(), VIN.to_string()).unwrap()
    }

    fn container_path(container: &str) -> String {
        format!("/vehicledata/v2/vehicles/{VIN}/containers/{container}")
    }

    #[tokio::test]
    async fn test_readings_are_decoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(container_path("payasyoudrive")))
            .and(bearer_token("valid-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"odo": {"value": "12345", "timestamp": 1700000000000i64}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&server, &dir, "valid-token");

        match client.fetch_container("payasyoudrive").await.unwrap() {
            ContainerData::Readings(items) => {
                assert_eq!(items.len(), 1);
                let reading = &items[0]["odo"];
                assert_eq!(reading.value, "12345");
                assert_eq!(reading.timestamp, 1_700_000_000_000);
            }
            other => panic!("expected readings, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_content_and_rate_limit_are_not_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(container_path("fuelstatus")))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(container_path("vehiclestatus")))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&server, &dir, "valid-token");

        assert!(matches!(
            client.fetch_container("fuelstatus").await.unwrap(),
            ContainerData::NoContent
        ));
        assert!(matches!(
            client.fetch_container("vehiclestatus").await.unwrap(),
            ContainerData::RateLimited
        ));
    }

    #[tokio::test]
    async fn test_401_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        // Stale bearer is rejected once; the refreshed one succeeds
        Mock::given(method("GET"))
            .and(path(container_path("payasyoudrive")))
            .and(bearer_token("stale-token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(container_path("payasyoudrive")))
            .and(bearer_token("fresh-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"odo": {"value": "1", "timestamp": 1700000000000i64}}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&server, &dir, "stale-token");

        assert!(matches!(
            client.fetch_container("payasyoudrive").await.unwrap(),
            ContainerData::Readings(_)
        ));
    }

    #[tokio::test]
    async fn test_persistent_401_gives_up_after_one_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(container_path("payasyoudrive")))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let client = client_with(&server, &dir, "stale-token");

        let err = client.fetch_container("payasyoudrive").await.unwrap_err();
        assert!(matches!(err, ApiError::Unexpected { status: 401, .. }));
    }
}

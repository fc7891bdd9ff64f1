//! Scrape-driven metric collection
//!
//! Each Prometheus scrape queries the vehicle data containers and refreshes
//! the gauges. When no valid token is available the scrape still succeeds:
//! vendor-derived gauges keep their previous values and the token status
//! gauge says why nothing new arrived.

pub mod resources;

use chrono::Utc;
use futures::future::join_all;
use metrics::{describe_gauge, gauge};
use std::collections::HashMap;

use crate::api::{ApiError, ContainerData, Reading, VehicleClient};
use crate::auth::AuthError;
use crate::collector::resources::{Container, CONTAINERS};

/// Token status gauge: says why vendor gauges did or did not update.
pub const TOKEN_STATUS_METRIC: &str = "mb_token_status";
/// No credential; the operator must visit /oauth.auth.
pub const TOKEN_STATUS_UNAUTHENTICATED: f64 = 0.0;
/// Authenticated with a valid access token.
pub const TOKEN_STATUS_OK: f64 = 1.0;
/// Credential present but refresh is failing transiently.
pub const TOKEN_STATUS_DEGRADED: f64 = 2.0;

/// Register help texts for every gauge this exporter can emit.
pub fn describe() {
    describe_gauge!(
        TOKEN_STATUS_METRIC,
        "OAuth token state: 0 = unauthenticated (visit /oauth.auth), \
         1 = authenticated, 2 = token refresh failing"
    );
    for container in CONTAINERS {
        for resource in container.resources {
            describe_gauge!(resource.metric_name(), resource.help);
            describe_gauge!(
                resource.measurement_time_name(),
                format!("Vendor measurement time of {}", resource.metric_name())
            );
            describe_gauge!(
                resource.update_time_name(),
                format!("Last update time of {}", resource.metric_name())
            );
        }
    }
}

pub struct Collector {
    client: VehicleClient,
}

impl Collector {
    pub fn new(client: VehicleClient) -> Self {
        Self { client }
    }

    /// Run one collection pass. Never fails: token trouble degrades to the
    /// status gauge, per-container errors are logged.
    pub async fn collect(&self) {
        match self.client.tokens().get_valid_token().await {
            Ok(_) => {}
            Err(AuthError::ReauthorizationRequired) => {
                self.set_token_status(TOKEN_STATUS_UNAUTHENTICATED);
                return;
            }
            Err(e) => {
                tracing::warn!("No valid token for this scrape: {}", e);
                self.set_token_status(TOKEN_STATUS_DEGRADED);
                return;
            }
        }
        self.set_token_status(TOKEN_STATUS_OK);

        let fetches = CONTAINERS
            .iter()
            .map(|container| self.client.fetch_container(container.name));
        let results = join_all(fetches).await;

        let now = Utc::now().timestamp_millis() as f64 / 1000.0;
        for (container, result) in CONTAINERS.iter().zip(results) {
            match result {
                Ok(ContainerData::Readings(items)) => self.apply(container, &items, now),
                Ok(ContainerData::NoContent) => self.touch_all(container, now),
                Ok(ContainerData::RateLimited) => {}
                Err(ApiError::Auth(AuthError::ReauthorizationRequired)) => {
                    self.set_token_status(TOKEN_STATUS_UNAUTHENTICATED);
                }
                Err(ApiError::Auth(e)) => {
                    tracing::warn!("Lost the token mid-scrape: {}", e);
                    self.set_token_status(TOKEN_STATUS_DEGRADED);
                }
                Err(e) => {
                    tracing::error!("Container {} request failed: {}", container.name, e);
                }
            }
        }
    }

    fn set_token_status(&self, status: f64) {
        gauge!(TOKEN_STATUS_METRIC, "vin" => self.client.vin().to_string()).set(status);
    }

    /// Feed fresh readings into the gauges. Expected resources missing from
    /// the body only get their update time touched.
    fn apply(&self, container: &Container, items: &[HashMap<String, Reading>], now: f64) {
        let vin = self.client.vin();
        let mut expected: HashMap<&str, &resources::Resource> = container
            .resources
            .iter()
            .map(|r| (r.key, r))
            .collect();

        for item in items {
            for (key, reading) in item {
                let Some(resource) = expected.remove(key.as_str()) else {
                    tracing::warn!("Unexpected resource {} in container {}", key, container.name);
                    continue;
                };
                match (resource.map)(&reading.value) {
                    Some(value) => {
                        gauge!(resource.metric_name(), "vin" => vin.to_string()).set(value);
                        gauge!(resource.measurement_time_name(), "vin" => vin.to_string())
                            .set(reading.timestamp as f64 / 1000.0);
                    }
                    None => {
                        tracing::warn!(
                            "Resource {} has unusable value {:?}",
                            key,
                            reading.value
                        );
                    }
                }
                gauge!(resource.update_time_name(), "vin" => vin.to_string()).set(now);
            }
        }

        for resource in expected.into_values() {
            gauge!(resource.update_time_name(), "vin" => vin.to_string()).set(now);
        }
    }

    /// The vehicle reported nothing new: only bump the update times.
    fn touch_all(&self, container: &Container, now: f64) {
        let vin = self.client.vin();
        for resource in container.resources {
            gauge!(resource.update_time_name(), "vin" => vin.to_string()).set(now);
        }
    }
}

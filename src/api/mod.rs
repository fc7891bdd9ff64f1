//! Vehicle data API access
//!
//! Wraps reqwest with bearer injection from the token manager and maps the
//! container responses the exporter consumes.

pub mod client;

pub use client::{ApiError, ContainerData, Reading, VehicleClient};

//! Metertrekker reads DSMR P1 telegrams from a smart meter and forwards the
//! readings as MQTT messages and InfluxDB line protocol records.
//!
//! The metric registry decides which OBIS identifiers are known, how their
//! values are interpreted and where each of them ends up.

pub mod config;
pub mod diagnostics;
pub mod influx;
pub mod metering_p1;
pub mod models;
pub mod mqtt;
pub mod obis_utils;
pub mod registry;

// Re-export common types for easier access
pub use config::Config;
pub use models::{Capability, MetricDefinition, MetricKind};
pub use registry::{MetricRegistry, RegistryConfig, RegistryError};
pub use metering_p1::P1Manager;
pub use metering_p1::dispatch::{DispatchEngine, DispatchOutcome};
pub use mqtt::MqttManager;

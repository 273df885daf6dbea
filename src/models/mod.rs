use serde::{Deserialize, Serialize};

/// The closed set of value kinds a metric can have. The kind decides how the
/// raw telegram value is transformed and where it may end up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    Meta,
    MetaText,
    Float,
    Text,
    Bare,
    Gas,
    Other,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Meta => "META",
            MetricKind::MetaText => "META_TEXT",
            MetricKind::Float => "FLOAT",
            MetricKind::Text => "TEXT",
            MetricKind::Bare => "BARE",
            MetricKind::Gas => "GAS",
            MetricKind::Other => "OTHER",
        }
    }

    /// META values never become fields of the aggregated measurement.
    pub fn is_storable(&self) -> bool {
        *self != MetricKind::Meta
    }

    /// Only "real" readings are published on their own topic.
    pub fn is_publishable(&self) -> bool {
        !matches!(self, MetricKind::Meta | MetricKind::MetaText)
    }
}

/// Flags enabling whole blocks of the metric table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// L2 and L3 readings of a three phase connection
    ThreePhase,
    /// Readings of a gas meter attached to the electricity meter
    Gas,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ThreePhase => "three_phase",
            Capability::Gas => "gas",
        }
    }
}

/// One row of the metric registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// OBIS reference, e.g. `1-0:1.8.1`
    pub identifier: String,
    pub kind: MetricKind,
    /// Column in the aggregated line protocol record, empty to skip
    #[serde(default)]
    pub storage_column: String,
    /// Topic path below the MQTT topic root, empty to skip
    #[serde(default)]
    pub publish_path: String,
    /// Only used for log output
    #[serde(default)]
    pub label: String,
}

impl MetricDefinition {
    pub fn new(identifier: &str, kind: MetricKind, storage_column: &str, publish_path: &str, label: &str) -> Self {
        MetricDefinition {
            identifier: identifier.to_string(),
            kind,
            storage_column: storage_column.to_string(),
            publish_path: publish_path.to_string(),
            label: label.to_string(),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.kind.is_storable() && !self.storage_column.is_empty()
    }

    pub fn is_published(&self) -> bool {
        self.kind.is_publishable() && !self.publish_path.is_empty()
    }
}

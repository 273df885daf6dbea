use chrono::{DateTime, FixedOffset};

use crate::influx::FieldValue;
use crate::models::MetricDefinition;

/// A telegram line matched to its definition, lives for one dispatch call
#[derive(Debug, Clone)]
pub struct ResolvedMetric<'a> {
    pub definition: &'a MetricDefinition,
    pub raw: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedValue {
    /// Representation for the line protocol record
    pub field: FieldValue,
    /// Representation for the MQTT payload
    pub payload: String,
    /// Unit suffix as sent by the meter, informational only
    pub unit: Option<String>,
    /// Capture time of a gas reading
    pub captured_at: Option<DateTime<FixedOffset>>,
}

impl TransformedValue {
    pub fn new(field: FieldValue, payload: String) -> Self {
        TransformedValue {
            field,
            payload,
            unit: None,
            captured_at: None,
        }
    }
}

/// An individual message for the MQTT transport. `path` is relative to the
/// configured topic root.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub path: String,
    pub payload: String,
}

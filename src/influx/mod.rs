//! InfluxDB line protocol encoding of the aggregated per-telegram measurement

use std::fmt::Write;

/// Value of a single line protocol field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Written unquoted as a float
    Float(f64),
    /// Written as a quoted and escaped string
    Text(String),
    /// Written unquoted exactly as received
    Bare(String),
}

impl FieldValue {
    pub fn to_line_protocol(&self) -> String {
        match self {
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Text(t) => format!("\"{}\"", escape_string_field(t)),
            FieldValue::Bare(b) => b.clone(),
        }
    }
}

/// Ordered column → value mapping collected over one telegram. A column is
/// stored at most once, later writes replace the value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedMeasurement {
    fields: Vec<(String, FieldValue)>,
}

impl AggregatedMeasurement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, column: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(c, _)| c == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineProtocolRecord {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: AggregatedMeasurement,
    /// Nanoseconds since the epoch, `None` lets the server assign the time
    pub timestamp: Option<i64>,
}

impl LineProtocolRecord {
    pub fn to_line(&self) -> String {
        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
        }

        let fields: Vec<String> = self.fields.iter()
            .map(|(column, value)| format!("{}={}", escape_key(column), value.to_line_protocol()))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));

        if let Some(ts) = self.timestamp {
            let _ = write!(line, " {}", ts);
        }
        line
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn escape_string_field(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

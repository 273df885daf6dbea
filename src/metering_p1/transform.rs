use thiserror::Error;

use super::structs::TransformedValue;
use crate::influx::FieldValue;
use crate::models::MetricKind;
use crate::obis_utils;

#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    #[error("Malformed value {raw:?}: {reason}")]
    MalformedValue { raw: String, reason: &'static str },
}

fn malformed(raw: &str, reason: &'static str) -> TransformError {
    TransformError::MalformedValue { raw: raw.to_string(), reason }
}

/// Turns the raw value of a telegram line into its storage and publish
/// representations.
///
/// `raw_field` is either the remainder of the line after the identifier,
/// e.g. `(001.234*kWh)`, or the bare value `001.234*kWh`.
pub fn transform(kind: MetricKind, raw_field: &str) -> Result<TransformedValue, TransformError> {
    let groups = obis_utils::split_groups(raw_field);
    let first = groups.first().copied().unwrap_or("");

    match kind {
        MetricKind::Meta => Ok(TransformedValue::new(FieldValue::Text(first.to_string()), first.to_string())),
        MetricKind::MetaText | MetricKind::Text => {
            let text = decode_text(first);
            Ok(TransformedValue::new(FieldValue::Text(text.clone()), text))
        }
        MetricKind::Float => parse_reading(first),
        MetricKind::Gas => {
            /* (capture time)(reading), the reading is always the last group */
            let reading = groups.last().copied().unwrap_or("");
            let mut value = parse_reading(reading)?;
            if groups.len() > 1 {
                value.captured_at = obis_utils::parse_telegram_timestamp(groups[groups.len() - 2]);
            }
            Ok(value)
        }
        MetricKind::Bare => {
            if first.is_empty() {
                return Err(malformed(raw_field, "empty value"));
            }
            if !obis_utils::is_bare_token(first) {
                return Err(malformed(raw_field, "not a plain token"));
            }
            Ok(TransformedValue::new(FieldValue::Bare(first.to_string()), first.to_string()))
        }
        MetricKind::Other => {
            let raw = raw_field.trim().to_string();
            Ok(TransformedValue::new(FieldValue::Text(raw.clone()), raw))
        }
    }
}

fn decode_text(value: &str) -> String {
    obis_utils::decode_hex_text(value).unwrap_or_else(|| value.to_string())
}

fn parse_reading(value: &str) -> Result<TransformedValue, TransformError> {
    let (magnitude, unit) = obis_utils::split_unit(value);
    if !obis_utils::is_decimal(magnitude) {
        return Err(malformed(value, "not a decimal number"));
    }

    let number: f64 = magnitude.parse()
        .map_err(|_| malformed(value, "not a decimal number"))?;
    if !number.is_finite() {
        return Err(malformed(value, "out of range"));
    }

    let mut transformed = TransformedValue::new(FieldValue::Float(number), number.to_string());
    transformed.unit = unit.map(|u| u.to_string());
    Ok(transformed)
}

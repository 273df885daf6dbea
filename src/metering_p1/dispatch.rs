use std::sync::Arc;
use chrono::{DateTime, FixedOffset};
use log::debug;
use serde::{Deserialize, Serialize};

use super::obis_parser::parse_obis_line;
use super::resolver::{resolve, Resolution};
use super::structs::{PublishRequest, ResolvedMetric};
use super::transform::transform;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::influx::{AggregatedMeasurement, LineProtocolRecord};
use crate::models::MetricKind;
use crate::obis_utils;
use crate::registry::MetricRegistry;

/// How a record carrying a gas reading is named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GasMode {
    /// Keep the electricity measurement and add a `type=<gas measurement>` tag
    Tag,
    /// Use the gas measurement name instead
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementNames {
    pub electricity: String,
    pub gas: String,
    pub gas_mode: GasMode,
}

impl Default for MeasurementNames {
    fn default() -> Self {
        MeasurementNames {
            electricity: "electricity".to_string(),
            gas: "gas".to_string(),
            gas_mode: GasMode::Tag,
        }
    }
}

/// Everything one telegram produced
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Identification line without the leading `/`
    pub header: Option<String>,
    /// Checksum text after the `!` end marker
    pub checksum: Option<String>,
    /// Individual messages in the order their lines were processed
    pub publish: Vec<PublishRequest>,
    pub record: Option<LineProtocolRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DispatchOutcome {
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    fn diagnose(&mut self, severity: Severity, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic::new(severity, kind, message));
    }
}

#[derive(Default)]
struct Cycle {
    fields: AggregatedMeasurement,
    timestamp: Option<DateTime<FixedOffset>>,
    has_gas: bool,
}

pub struct DispatchEngine {
    registry: Arc<MetricRegistry>,
    names: MeasurementNames,
}

impl DispatchEngine {
    pub fn new(registry: Arc<MetricRegistry>, names: MeasurementNames) -> Self {
        Self { registry, names }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Processes all lines of one telegram. Bad lines are skipped and reported
    /// in the diagnostics, they never abort the rest of the telegram.
    pub fn process_telegram<I, S>(&self, lines: I) -> DispatchOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = DispatchOutcome::default();
        let mut cycle = Cycle::default();

        for line in lines {
            let line = line.as_ref().trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('/') {
                outcome.header = Some(header.to_string());
                continue;
            }

            if let Some(checksum) = line.strip_prefix('!') {
                debug!("End of telegram found");
                let checksum = checksum.trim();
                if !checksum.is_empty() {
                    outcome.checksum = Some(checksum.to_string());
                }
                break;
            }

            self.process_line(line, &mut outcome, &mut cycle);
        }

        outcome.record = self.finalize(cycle);
        outcome
    }

    fn process_line(&self, line: &str, outcome: &mut DispatchOutcome, cycle: &mut Cycle) {
        let parsed = match parse_obis_line(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                outcome.diagnose(Severity::Warning, DiagnosticKind::MalformedLine,
                                 format!("Skipping line {:?}: {}", line, e));
                return;
            }
        };

        let metric = match resolve(parsed.identifier, &self.registry) {
            Resolution::Known(definition) => ResolvedMetric { definition, raw: parsed.remainder },
            Resolution::Unknown => {
                outcome.diagnose(Severity::Debug, DiagnosticKind::UnknownIdentifier,
                                 format!("Ignoring unknown identifier {}", parsed.identifier));
                return;
            }
        };
        let definition = metric.definition;

        let value = match transform(definition.kind, metric.raw) {
            Ok(value) => value,
            Err(e) => {
                outcome.diagnose(Severity::Warning, DiagnosticKind::MalformedValue,
                                 format!("{} ({}): {}", definition.identifier, definition.label, e));
                return;
            }
        };
        match value.captured_at {
            Some(at) => debug!("{} ({}): {} {} captured at {}", definition.identifier, definition.label,
                               value.payload, value.unit.as_deref().unwrap_or(""), at.to_rfc3339()),
            None => debug!("{} ({}): {} {}", definition.identifier, definition.label, value.payload,
                           value.unit.as_deref().unwrap_or("")),
        }

        if definition.kind == MetricKind::Meta {
            /* a stored META value that carries a telegram time stamps the record */
            if !definition.storage_column.is_empty() {
                if let Some(ts) = obis_utils::parse_telegram_timestamp(&value.payload) {
                    cycle.timestamp = Some(ts);
                }
            }
            return;
        }

        if definition.is_stored() {
            cycle.fields.upsert(&definition.storage_column, value.field);
            if definition.kind == MetricKind::Gas {
                cycle.has_gas = true;
            }
        }

        if definition.is_published() {
            /* coalesced destinations: the last line processed wins */
            outcome.publish.retain(|p| p.path != definition.publish_path);
            outcome.publish.push(PublishRequest {
                path: definition.publish_path.clone(),
                payload: value.payload,
            });
        }
    }

    fn finalize(&self, cycle: Cycle) -> Option<LineProtocolRecord> {
        if cycle.fields.is_empty() {
            return None;
        }

        let mut measurement = self.names.electricity.clone();
        let mut tags = Vec::new();
        if cycle.has_gas {
            match self.names.gas_mode {
                GasMode::Tag => tags.push(("type".to_string(), self.names.gas.clone())),
                GasMode::Replace => measurement = self.names.gas.clone(),
            }
        }

        Some(LineProtocolRecord {
            measurement,
            tags,
            fields: cycle.fields,
            timestamp: cycle.timestamp.and_then(|ts| ts.timestamp_nanos_opt()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::influx::FieldValue;
    use crate::models::Capability;
    use crate::registry::{metric_table, RegistryConfig};

    fn engine(names: MeasurementNames) -> DispatchEngine {
        let registry = MetricRegistry::build(&RegistryConfig::default()).unwrap();
        DispatchEngine::new(Arc::new(registry), names)
    }

    #[test]
    fn test_float_line() {
        let outcome = engine(MeasurementNames::default()).process_telegram(["1-0:1.8.1(001.234*kWh)"]);

        let record = outcome.record.unwrap();
        assert_eq!(record.fields.get("delivered_low"), Some(&FieldValue::Float(1.234)));
        assert_eq!(outcome.publish, vec![PublishRequest {
            path: "/energy/mains/reading/delivered/low".to_string(),
            payload: "1.234".to_string(),
        }]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_unknown_identifier() {
        let outcome = engine(MeasurementNames::default()).process_telegram(["9-9:99.99.99(12)"]);
        assert!(outcome.record.is_none());
        assert!(outcome.publish.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.count(DiagnosticKind::UnknownIdentifier), 1);
        assert_eq!(outcome.diagnostics[0].severity, Severity::Debug);
    }

    #[test]
    fn test_malformed_value_does_not_abort() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "1-0:1.8.1(abc*kWh)",
            "1-0:1.8.2(000002.500*kWh)",
        ]);

        assert_eq!(outcome.count(DiagnosticKind::MalformedValue), 1);
        let record = outcome.record.unwrap();
        assert!(record.fields.get("delivered_low").is_none());
        assert_eq!(record.fields.get("delivered_high"), Some(&FieldValue::Float(2.5)));
        assert_eq!(outcome.publish.len(), 1);
        assert_eq!(outcome.publish[0].path, "/energy/mains/reading/delivered/high");
    }

    #[test]
    fn test_overflowing_float_keeps_record_valid() {
        let huge = format!("1-0:1.8.1({}*kWh)", "9".repeat(400));
        let outcome = engine(MeasurementNames::default()).process_telegram([
            huge.as_str(),
            "1-0:1.8.2(000002.500*kWh)",
        ]);

        assert_eq!(outcome.count(DiagnosticKind::MalformedValue), 1);
        assert!(outcome.publish.iter().all(|p| p.payload != "inf"));
        assert_eq!(outcome.record.unwrap().to_line(), "electricity delivered_high=2.5");
    }

    #[test]
    fn test_bare_value_cannot_inject_fields() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "0-0:96.14.0(0002 evil=1)",
            "1-0:1.8.2(000002.500*kWh)",
        ]);

        assert_eq!(outcome.count(DiagnosticKind::MalformedValue), 1);
        assert_eq!(outcome.publish.len(), 1);
        assert_eq!(outcome.record.unwrap().to_line(), "electricity delivered_high=2.5");
    }

    #[test]
    fn test_malformed_line() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "this is not a telegram line",
            "1-0:1.7.0(01.193*kW)",
        ]);
        assert_eq!(outcome.count(DiagnosticKind::MalformedLine), 1);
        assert_eq!(outcome.publish.len(), 1);
    }

    #[test]
    fn test_message_coalescing() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "0-0:96.13.1(3031203631203831)",
            "0-0:96.13.0(48656c6c6f)",
        ]);

        let record = outcome.record.unwrap();
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields.get("message"), Some(&FieldValue::Text("Hello".to_string())));
        assert_eq!(outcome.publish, vec![PublishRequest {
            path: "/energy/mains/message".to_string(),
            payload: "Hello".to_string(),
        }]);
    }

    #[test]
    fn test_meta_lines() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "1-3:0.2.8(50)",
            "0-0:1.0.0(101209113020W)",
        ]);
        /* META never becomes a field */
        assert!(outcome.record.is_none());
        assert!(outcome.publish.is_empty());

        let outcome = engine(MeasurementNames::default()).process_telegram([
            "0-0:1.0.0(101209113020W)",
            "0-0:96.1.1(4B384547303034303436333935353037)",
        ]);
        let record = outcome.record.unwrap();
        assert_eq!(record.timestamp, Some(1291890620000000000));
        assert_eq!(record.fields.get("meter_sn"), Some(&FieldValue::Text("K8EG004046395507".to_string())));
        assert!(record.fields.get("timestamp").is_none());
        /* META_TEXT is not published */
        assert!(outcome.publish.is_empty());
    }

    #[test]
    fn test_gas_tagging() {
        let lines = ["1-0:1.7.0(01.193*kW)", "0-1:24.2.1(101209112500W)(12785.123*m3)"];

        let record = engine(MeasurementNames::default()).process_telegram(lines).record.unwrap();
        assert_eq!(record.measurement, "electricity");
        assert_eq!(record.tags, vec![("type".to_string(), "gas".to_string())]);
        assert_eq!(record.to_line(), "electricity,type=gas P_total=1.193,gas_reading=12785.123");

        let names = MeasurementNames { gas_mode: GasMode::Replace, ..Default::default() };
        let record = engine(names).process_telegram(lines).record.unwrap();
        assert_eq!(record.measurement, "gas");
        assert!(record.tags.is_empty());

        let record = engine(MeasurementNames::default()).process_telegram(["1-0:1.7.0(01.193*kW)"]).record.unwrap();
        assert_eq!(record.measurement, "electricity");
        assert!(record.tags.is_empty());
    }

    #[test]
    fn test_header_and_end_marker() {
        let outcome = engine(MeasurementNames::default()).process_telegram([
            "/ISk5\\2MT382-1000",
            "",
            "1-0:1.7.0(01.193*kW)",
            "!EF2F",
            "1-0:2.7.0(00.000*kW)",
        ]);
        assert_eq!(outcome.header.as_deref(), Some("ISk5\\2MT382-1000"));
        assert_eq!(outcome.checksum.as_deref(), Some("EF2F"));
        /* nothing after the end marker is processed */
        assert_eq!(outcome.publish.len(), 1);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_empty_telegram() {
        let outcome = engine(MeasurementNames::default()).process_telegram(Vec::<String>::new());
        assert!(outcome.record.is_none());
        assert!(outcome.publish.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_three_phase_flag() {
        let lines = ["1-0:52.7.0(231.2*V)"];

        let outcome = engine(MeasurementNames::default()).process_telegram(lines);
        assert_eq!(outcome.count(DiagnosticKind::UnknownIdentifier), 1);

        let registry = MetricRegistry::build(&RegistryConfig {
            capabilities: vec![Capability::ThreePhase],
            ..Default::default()
        }).unwrap();
        let outcome = DispatchEngine::new(Arc::new(registry), MeasurementNames::default()).process_telegram(lines);
        assert_eq!(outcome.record.unwrap().fields.get("V_L2"), Some(&FieldValue::Float(231.2)));
    }

    #[test]
    fn test_example_telegram() {
        let e = engine(MeasurementNames::default());
        let outcome = e.process_telegram(metric_table::example_telegram().lines());

        assert_eq!(outcome.header.as_deref(), Some("ISk5\\2MT382-1000"));
        assert!(outcome.diagnostics.is_empty(), "{:?}", outcome.diagnostics);

        let record = outcome.record.unwrap();
        assert_eq!(record.measurement, "electricity");
        assert_eq!(record.timestamp, Some(1291890620000000000));
        assert_eq!(record.fields.get("delivered_low"), Some(&FieldValue::Float(123456.789)));
        assert_eq!(record.fields.get("tariff"), Some(&FieldValue::Bare("0002".to_string())));
        assert_eq!(record.fields.get("I_L1"), Some(&FieldValue::Float(1.0)));
        assert_eq!(record.fields.get("gas_meter_sn"), Some(&FieldValue::Text("2222ABCD123456789".to_string())));
        assert_eq!(record.fields.get("message"), Some(&FieldValue::Text("0123456789:;<=>?".to_string())));
        assert!(matches!(record.fields.get("failure_log"), Some(FieldValue::Text(t)) if t.starts_with("(2)(0-0:96.7.19)")));

        let paths: Vec<&str> = outcome.publish.iter().map(|p| p.path.as_str()).collect();
        assert!(paths.contains(&"/energy/gas/reading"));
        assert!(!paths.contains(&"/energy/mains/power/L2"));
        /* one message topic even though two message lines were sent */
        assert_eq!(paths.iter().filter(|p| **p == "/energy/mains/message").count(), 1);
        /* gas device type has neither column nor path */
        assert_eq!(outcome.publish.len(), 17);
    }
}

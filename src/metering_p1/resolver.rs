use crate::models::MetricDefinition;
use crate::registry::MetricRegistry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    Known(&'a MetricDefinition),
    /// Not tracked by the registry. Meters send plenty of those, it is not an error.
    Unknown,
}

/// Exact, case sensitive match of the identifier against the enabled definitions
pub fn resolve<'a>(raw_identifier: &str, registry: &'a MetricRegistry) -> Resolution<'a> {
    match registry.lookup(raw_identifier) {
        Some(definition) => Resolution::Known(definition),
        None => Resolution::Unknown,
    }
}

use std::collections::{BTreeSet, HashMap};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Capability, MetricDefinition, MetricKind};
use crate::obis_utils;

pub mod metric_table;

pub const MAX_IDENTIFIER_LEN: usize = 11;
pub const MAX_COLUMN_LEN: usize = 23;
pub const MAX_PATH_LEN: usize = 47;
pub const MAX_LABEL_LEN: usize = 47;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Identifier {0} is defined more than once")]
    DuplicateIdentifier(String),
    #[error("Invalid OBIS identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("The {field} of {identifier} is longer than {max} characters")]
    TooLong { identifier: String, field: &'static str, max: usize },
    #[error("Invalid storage column {column:?} for {identifier}")]
    InvalidColumn { identifier: String, column: String },
    #[error("Invalid publish path {path:?} for {identifier}")]
    InvalidPath { identifier: String, path: String },
    #[error("{first} and {second} share {destination} {name:?} with different kinds")]
    KindConflict { first: String, second: String, destination: &'static str, name: String },
    #[error("Disabled identifier {0} is not part of the metric table")]
    UnknownDisabled(String),
}

fn capabilities_default() -> Vec<Capability> { vec![Capability::Gas] }

/// Selects which definitions end up in the registry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    #[serde(default="capabilities_default")]
    pub capabilities: Vec<Capability>,
    /// Identifiers of table rows to leave out
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Definitions appended after the table rows
    #[serde(default)]
    pub extra: Vec<MetricDefinition>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            capabilities: capabilities_default(),
            disabled: Vec::new(),
            extra: Vec::new(),
        }
    }
}

/// The immutable set of enabled metric definitions.
///
/// Definitions keep the table order for iteration, lookups go through a hash
/// index on the identifier.
#[derive(Debug)]
pub struct MetricRegistry {
    definitions: Vec<MetricDefinition>,
    index: HashMap<String, usize>,
    capabilities: BTreeSet<Capability>,
}

impl MetricRegistry {
    pub fn build(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let table = metric_table::canonical_table();

        for disabled in &config.disabled {
            if !table.iter().any(|r| &r.definition.identifier == disabled) {
                return Err(RegistryError::UnknownDisabled(disabled.clone()));
            }
        }

        let capabilities: BTreeSet<Capability> = config.capabilities.iter().copied().collect();
        let definitions: Vec<MetricDefinition> = table.into_iter()
            .filter(|r| r.requires.map_or(true, |c| capabilities.contains(&c)))
            .map(|r| r.definition)
            .filter(|d| !config.disabled.contains(&d.identifier))
            .chain(config.extra.iter().cloned())
            .collect();

        let mut registry = Self::from_definitions(definitions)?;
        registry.capabilities = capabilities;

        info!("Metric registry built with {} definitions (schema version {}, capabilities {:?})",
              registry.len(), metric_table::SCHEMA_VERSION,
              registry.capabilities.iter().map(|c| c.as_str()).collect::<Vec<_>>());
        Ok(registry)
    }

    /// Validates and indexes an explicit list of definitions
    pub fn from_definitions(definitions: Vec<MetricDefinition>) -> Result<Self, RegistryError> {
        let index = index_definitions(&definitions)?;
        Ok(MetricRegistry {
            definitions,
            index,
            capabilities: BTreeSet::new(),
        })
    }

    pub fn lookup(&self, identifier: &str) -> Option<&MetricDefinition> {
        self.index.get(identifier).map(|pos| &self.definitions[*pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }
}

fn index_definitions(definitions: &[MetricDefinition]) -> Result<HashMap<String, usize>, RegistryError> {
    let mut index = HashMap::with_capacity(definitions.len());
    let mut columns: HashMap<&str, (&str, MetricKind)> = HashMap::new();
    let mut paths: HashMap<&str, (&str, MetricKind)> = HashMap::new();

    for (pos, definition) in definitions.iter().enumerate() {
        validate_definition(definition)?;

        if index.insert(definition.identifier.clone(), pos).is_some() {
            return Err(RegistryError::DuplicateIdentifier(definition.identifier.clone()));
        }

        if !definition.storage_column.is_empty() {
            check_shared(&mut columns, "column", &definition.storage_column, definition)?;
        }
        if !definition.publish_path.is_empty() {
            check_shared(&mut paths, "path", &definition.publish_path, definition)?;
        }
        debug!("Registered {} ({}) as {}", definition.identifier, definition.label, definition.kind.as_str());
    }

    Ok(index)
}

fn check_shared<'a>(seen: &mut HashMap<&'a str, (&'a str, MetricKind)>, destination: &'static str,
                    name: &'a str, definition: &'a MetricDefinition) -> Result<(), RegistryError> {
    match seen.get(name) {
        Some((first, kind)) if *kind != definition.kind => {
            Err(RegistryError::KindConflict {
                first: first.to_string(),
                second: definition.identifier.clone(),
                destination,
                name: name.to_string(),
            })
        }
        Some(_) => Ok(()),
        None => {
            seen.insert(name, (&definition.identifier, definition.kind));
            Ok(())
        }
    }
}

fn check_len(definition: &MetricDefinition, field: &'static str, value: &str, max: usize) -> Result<(), RegistryError> {
    if value.chars().count() > max {
        return Err(RegistryError::TooLong { identifier: definition.identifier.clone(), field, max });
    }
    Ok(())
}

fn validate_definition(definition: &MetricDefinition) -> Result<(), RegistryError> {
    if !obis_utils::validate_obis_code(&definition.identifier) {
        return Err(RegistryError::InvalidIdentifier(definition.identifier.clone()));
    }
    check_len(definition, "identifier", &definition.identifier, MAX_IDENTIFIER_LEN)?;
    check_len(definition, "storage column", &definition.storage_column, MAX_COLUMN_LEN)?;
    check_len(definition, "publish path", &definition.publish_path, MAX_PATH_LEN)?;
    check_len(definition, "label", &definition.label, MAX_LABEL_LEN)?;

    /* Columns end up unescaped as line protocol field keys */
    if definition.storage_column.chars().any(|c| c.is_whitespace() || matches!(c, ',' | '=' | '"' | '\\')) {
        return Err(RegistryError::InvalidColumn {
            identifier: definition.identifier.clone(),
            column: definition.storage_column.clone(),
        });
    }

    let path = &definition.publish_path;
    if !path.is_empty() && (!path.starts_with('/') || path.chars().any(|c| c.is_whitespace() || c == '+' || c == '#')) {
        return Err(RegistryError::InvalidPath {
            identifier: definition.identifier.clone(),
            path: path.clone(),
        });
    }

    Ok(())
}

use std::sync::atomic::{AtomicU64, Ordering};
use lazy_static::lazy_static;
use log::Level;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn level(&self) -> Level {
        match self {
            Severity::Debug => Level::Debug,
            Severity::Info => Level::Info,
            Severity::Warning => Level::Warn,
            Severity::Error => Level::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticKind {
    UnknownIdentifier,
    MalformedLine,
    MalformedValue,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, kind: DiagnosticKind, message: String) -> Self {
        Diagnostic { severity, kind, message }
    }

    pub fn log(&self) {
        log::log!(self.severity.level(), "{:?}: {}", self.kind, self.message);
    }
}

/// Process wide counters. They only ever grow and are reset by a restart.
#[derive(Debug, Default)]
pub struct DispatchStats {
    telegrams: AtomicU64,
    publish_requests: AtomicU64,
    records: AtomicU64,
    unknown_identifiers: AtomicU64,
    malformed_lines: AtomicU64,
    malformed_values: AtomicU64,
    checksum_failures: AtomicU64,
    acquisition_timeouts: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub telegrams: u64,
    pub publish_requests: u64,
    pub records: u64,
    pub unknown_identifiers: u64,
    pub malformed_lines: u64,
    pub malformed_values: u64,
    pub checksum_failures: u64,
    pub acquisition_timeouts: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_telegram(&self, publish_requests: usize, has_record: bool, diagnostics: &[Diagnostic]) {
        self.telegrams.fetch_add(1, Ordering::Relaxed);
        self.publish_requests.fetch_add(publish_requests as u64, Ordering::Relaxed);
        if has_record {
            self.records.fetch_add(1, Ordering::Relaxed);
        }
        for diagnostic in diagnostics {
            let counter = match diagnostic.kind {
                DiagnosticKind::UnknownIdentifier => &self.unknown_identifiers,
                DiagnosticKind::MalformedLine => &self.malformed_lines,
                DiagnosticKind::MalformedValue => &self.malformed_values,
                DiagnosticKind::Configuration => continue,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_checksum_failure(&self) {
        self.checksum_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.acquisition_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            telegrams: self.telegrams.load(Ordering::Relaxed),
            publish_requests: self.publish_requests.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            unknown_identifiers: self.unknown_identifiers.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            malformed_values: self.malformed_values.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            acquisition_timeouts: self.acquisition_timeouts.load(Ordering::Relaxed),
        }
    }
}

lazy_static! {
    pub static ref STATS: DispatchStats = DispatchStats::new();
}

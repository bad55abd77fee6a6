// Domain models for watched services and the Drone API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch used when a service does not name one
pub const DEFAULT_BRANCH: &str = "master";

/// Default seconds between polling cycles
pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 300;

/// Default number of builds examined when searching backward for a branch
pub const DEFAULT_MAX_LOOKBACK: u64 = 100;

/// Process-wide connection settings for the Drone host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub drone_host: String,
    pub auth_key: String,
    pub poll_interval_seconds: u64,
    pub max_lookback: u64,
}

/// One monitored target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceWatch {
    pub name: String,
    pub source_url: String,
    pub path_expression: String,
    pub target_repo: String,
    pub branch: String,
    pub last_value: Option<WatchValue>,
}

impl ServiceWatch {
    pub fn is_initialized(&self) -> bool {
        self.last_value.is_some()
    }
}

/// A scalar resolved from a source document.
///
/// Stored as its canonical text form so that values read back from the config file
/// compare equal to freshly resolved ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchValue(String);

impl WatchValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Canonical rendering of a JSON scalar. Returns None for objects and arrays.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            serde_json::Value::Bool(b) => Some(Self(b.to_string())),
            serde_json::Value::Null => Some(Self("null".to_string())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WatchValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A build as reported by `/api/repos/{repo}/builds/...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub number: u64,
    pub branch: String,
}

/// What happened to a single service during a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First value stored, no build triggered
    Initialized(WatchValue),
    Unchanged,
    /// Build forked and the new value persisted
    Triggered {
        previous: WatchValue,
        current: WatchValue,
        build_number: u64,
    },
    /// Value changed but the trigger failed; retried next cycle
    TriggerFailed {
        previous: WatchValue,
        current: WatchValue,
    },
    /// Value accepted in memory but the store write failed; retried before the next cycle.
    /// `build_number` is None when the value was an initial one.
    PersistFailed {
        current: WatchValue,
        build_number: Option<u64>,
    },
    /// Fetch or resolve failed; service skipped this cycle
    Skipped,
}

impl CheckOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Initialized(_) => "initialized",
            CheckOutcome::Unchanged => "unchanged",
            CheckOutcome::Triggered { .. } => "triggered",
            CheckOutcome::TriggerFailed { .. } => "trigger_failed",
            CheckOutcome::PersistFailed { .. } => "persist_failed",
            CheckOutcome::Skipped => "skipped",
        }
    }
}

/// Summary of one pass over all services
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub unchanged: usize,
    pub initialized: usize,
    pub triggered: usize,
    pub trigger_failed: usize,
    pub skipped: usize,
    pub persist_failed: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: &CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Initialized(_) => self.initialized += 1,
            CheckOutcome::Unchanged => self.unchanged += 1,
            CheckOutcome::Triggered { .. } => self.triggered += 1,
            CheckOutcome::TriggerFailed { .. } => self.trigger_failed += 1,
            CheckOutcome::PersistFailed { .. } => self.persist_failed += 1,
            CheckOutcome::Skipped => self.skipped += 1,
        }
    }
}

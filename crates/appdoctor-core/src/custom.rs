//! Compiled-in custom checks and their isolated execution.
//!
//! A custom check receives the engine (read-only) and may hand back one
//! finding. Errors and panics are contained: each becomes a single
//! "Custom Check Error" finding and the run carries on.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::doctor::Doctor;
use crate::finding::{Finding, Level};

/// A user-supplied check.
pub trait CustomCheck: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &str {
        "custom"
    }

    fn run(&self, doctor: &Doctor) -> anyhow::Result<Option<CustomFinding>>;
}

impl<F> CustomCheck for F
where
    F: Fn(&Doctor) -> anyhow::Result<Option<CustomFinding>> + Send + Sync,
{
    fn run(&self, doctor: &Doctor) -> anyhow::Result<Option<CustomFinding>> {
        self(doctor)
    }
}

fn default_message() -> String {
    "Custom Check".to_string()
}

fn default_level() -> Level {
    Level::Info
}

/// What a custom check reports; converts into a [`Finding`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomFinding {
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_level")]
    pub level: Level,
    #[serde(default)]
    pub advice: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl CustomFinding {
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self {
            message: message.into(),
            level,
            advice: String::new(),
            details: Map::new(),
        }
    }

    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = advice.into();
        self
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = details;
        self
    }

    /// Build from a loosely-typed map such as `{"message": "X", "level": "ok"}`.
    /// An unrecognised `level` is an error.
    pub fn from_value(value: Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_finding(self) -> Finding {
        Finding::new(self.message, self.level)
            .with_advice(self.advice)
            .with_details(self.details)
    }
}

/// Named checks that configuration can refer to.
#[derive(Clone, Default)]
pub struct CustomCheckRegistry {
    checks: BTreeMap<String, Arc<dyn CustomCheck>>,
}

impl std::fmt::Debug for CustomCheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCheckRegistry")
            .field("checks", &self.checks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CustomCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, check: impl CustomCheck + 'static) {
        self.checks.insert(name.into(), Arc::new(check));
    }

    /// Register a closure; the signature is spelled out so closures infer.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&Doctor) -> anyhow::Result<Option<CustomFinding>> + Send + Sync + 'static,
    {
        self.register(name, check);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomCheck>> {
        self.checks.get(name).cloned()
    }

    /// Checks for `names`, in the given order; unknown names are skipped.
    pub fn resolve(&self, names: &[String]) -> Vec<(String, Arc<dyn CustomCheck>)> {
        names
            .iter()
            .filter_map(|name| match self.get(name) {
                Some(check) => Some((name.clone(), check)),
                None => {
                    debug!(check = %name, "custom check not registered, skipping");
                    None
                }
            })
            .collect()
    }
}

pub(crate) fn panic_reason(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "check panicked".to_string()
    }
}

fn failure(reason: impl std::fmt::Display) -> Finding {
    Finding::new("Custom Check Error", Level::Error)
        .with_advice(format!("Custom check failed: {}", reason))
}

/// Run one check, converting errors and panics into a failure finding.
pub fn run_isolated(name: &str, check: &dyn CustomCheck, doctor: &Doctor) -> Option<Finding> {
    match catch_unwind(AssertUnwindSafe(|| check.run(doctor))) {
        Ok(Ok(Some(found))) => Some(found.into_finding()),
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            warn!(check = %name, error = %e, "custom check failed");
            Some(failure(e))
        }
        Err(payload) => {
            let reason = panic_reason(payload.as_ref());
            warn!(check = %name, reason = %reason, "custom check panicked");
            Some(failure(reason))
        }
    }
}

/// Run `checks` in order and collect what they report.
pub fn run_checks(doctor: &Doctor, checks: &[(String, Arc<dyn CustomCheck>)]) -> Vec<Finding> {
    checks
        .iter()
        .filter_map(|(name, check)| run_isolated(name, check.as_ref(), doctor))
        .collect()
}

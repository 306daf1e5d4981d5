//! Finding model: severity levels, the append-only result sink and summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DoctorError;

/// Serialize timestamps as ISO 8601 with microsecond precision (`...:05.123456Z`).
pub mod iso_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Severity of a finding, least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ok,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// All levels in ascending severity.
    pub const ALL: [Level; 5] = [
        Level::Ok,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Ok => "ok",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }

    /// Whether a finding at this level counts toward `critical_issues`.
    ///
    /// Errors count as well as criticals; alert thresholds and the CLI exit
    /// code depend on this.
    pub fn is_critical(&self) -> bool {
        matches!(self, Level::Error | Level::Critical)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = DoctorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ok" => Ok(Level::Ok),
            "info" => Ok(Level::Info),
            "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            other => Err(DoctorError::UnknownLevel(other.to_string())),
        }
    }
}

/// One diagnostic result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    /// Short title of the finding.
    pub message: String,

    /// Severity.
    pub level: Level,

    /// What to do about it (may be empty).
    #[serde(default)]
    pub advice: String,

    /// Structured extras (log entry level, counts, ...).
    #[serde(default)]
    pub details: Map<String, Value>,

    /// Creation time, UTC, truncated to microseconds.
    #[serde(with = "iso_micros")]
    pub timestamp: DateTime<Utc>,
}

impl Finding {
    /// Create a finding stamped with the current time.
    pub fn new(message: impl Into<String>, level: Level) -> Self {
        Self {
            message: message.into(),
            level,
            advice: String::new(),
            details: Map::new(),
            timestamp: Utc::now().trunc_subsecs(6),
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
}

/// Append-only, insertion-ordered collection of findings for one run.
///
/// Keeps a running count of error/critical findings alongside the list.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    items: Vec<Finding>,
    critical_issues: usize,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finding with empty details.
    pub fn add(&mut self, message: impl Into<String>, level: Level, advice: impl Into<String>) {
        self.push(Finding::new(message, level).with_advice(advice));
    }

    /// Record a finding carrying structured details.
    pub fn add_with_details(
        &mut self,
        message: impl Into<String>,
        level: Level,
        advice: impl Into<String>,
        details: Map<String, Value>,
    ) {
        self.push(
            Finding::new(message, level)
                .with_advice(advice)
                .with_details(details),
        );
    }

    /// Append an already-built finding.
    pub fn push(&mut self, finding: Finding) {
        if finding.level.is_critical() {
            self.critical_issues += 1;
        }
        self.items.push(finding);
    }

    /// Drop everything recorded so far (start of a new run).
    pub fn reset(&mut self) {
        self.items.clear();
        self.critical_issues = 0;
    }

    pub fn as_slice(&self) -> &[Finding] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of error + critical findings recorded.
    pub fn critical_issues(&self) -> usize {
        self.critical_issues
    }

    pub fn summary(&self) -> Summary {
        Summary::from_findings(&self.items)
    }
}

impl<'a> IntoIterator for &'a Findings {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Aggregate counts over a finding sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_checks: usize,
    pub critical_issues: usize,
    pub levels: BTreeMap<Level, usize>,
}

impl Summary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut levels: BTreeMap<Level, usize> = Level::ALL.iter().map(|l| (*l, 0)).collect();
        for finding in findings {
            *levels.entry(finding.level).or_insert(0) += 1;
        }
        let critical_issues = levels[&Level::Error] + levels[&Level::Critical];

        Self {
            total_checks: findings.len(),
            critical_issues,
            levels,
        }
    }

    pub fn count(&self, level: Level) -> usize {
        self.levels.get(&level).copied().unwrap_or(0)
    }

    pub fn is_healthy(&self) -> bool {
        self.critical_issues == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Ok < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
    }

    #[test]
    fn test_level_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Warning).unwrap(), "\"warning\"");
        let parsed: Level = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, Level::Critical);
    }

    #[test]
    fn test_level_from_str_rejects_unknown() {
        assert_eq!("ERROR".parse::<Level>().unwrap(), Level::Error);
        let err = "fatal".parse::<Level>().unwrap_err();
        assert!(err.to_string().contains("fatal"));
    }

    #[test]
    fn test_is_critical_counts_error_and_critical() {
        assert!(!Level::Ok.is_critical());
        assert!(!Level::Info.is_critical());
        assert!(!Level::Warning.is_critical());
        assert!(Level::Error.is_critical());
        assert!(Level::Critical.is_critical());
    }

    #[test]
    fn test_timestamp_has_microsecond_precision() {
        let finding = Finding::new("Check", Level::Ok);
        let raw = serde_json::to_value(&finding).unwrap();
        let ts = raw["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'));
        let fraction = ts.rsplit('.').next().unwrap().trim_end_matches('Z');
        assert_eq!(fraction.len(), 6);
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_finding_json_round_trip_is_lossless() {
        let mut details = Map::new();
        details.insert("level".to_string(), json!("ERROR"));
        let finding = Finding::new("Log Errors Found", Level::Error)
            .with_advice("Review logs")
            .with_details(details);

        let raw = serde_json::to_string(&finding).unwrap();
        let back: Finding = serde_json::from_str(&raw).unwrap();
        assert_eq!(finding, back);
    }

    #[test]
    fn test_findings_counts_critical_issues() {
        let mut findings = Findings::new();
        findings.add("a", Level::Ok, "");
        findings.add("b", Level::Error, "");
        findings.add("c", Level::Error, "");
        findings.add("d", Level::Critical, "");
        findings.add("e", Level::Info, "");

        assert_eq!(findings.len(), 5);
        assert_eq!(findings.critical_issues(), 3);

        let summary = findings.summary();
        assert_eq!(summary.total_checks, 5);
        assert_eq!(summary.critical_issues, 3);
        assert_eq!(summary.levels.values().sum::<usize>(), summary.total_checks);
    }

    #[test]
    fn test_findings_preserve_insertion_order() {
        let mut findings = Findings::new();
        findings.add("first", Level::Critical, "");
        findings.add("second", Level::Ok, "");
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn test_reset_clears_results_and_counter() {
        let mut findings = Findings::new();
        findings.add("x", Level::Critical, "");
        findings.reset();
        assert!(findings.is_empty());
        assert_eq!(findings.critical_issues(), 0);
    }

    #[test]
    fn test_summary_lists_every_level() {
        let summary = Summary::from_findings(&[]);
        assert_eq!(summary.levels.len(), 5);
        assert!(summary.is_healthy());

        let raw = serde_json::to_value(&summary).unwrap();
        assert_eq!(raw["levels"]["ok"], json!(0));
        assert_eq!(raw["levels"]["critical"], json!(0));
    }
}

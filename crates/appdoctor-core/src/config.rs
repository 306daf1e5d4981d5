//! Doctor configuration and the `appdoctor.toml` settings file.
//!
//! Resolution order: built-in defaults, settings file, caller overrides,
//! then the `ADMIN_ALERT_EMAIL` fallback.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DoctorError, Result};
use crate::export::ExportFormat;

/// Settings file looked up in the application root when none is given.
pub const SETTINGS_FILE_NAME: &str = "appdoctor.toml";

/// Environment variable that supplies a fallback admin email.
pub const ADMIN_EMAIL_ENV: &str = "ADMIN_ALERT_EMAIL";

/// Options recognised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorConfig {
    pub send_email_alerts: bool,
    pub admin_email: Option<String>,
    pub ignored_paths: Vec<String>,
    /// Names of compiled-in custom checks to resolve from the registry.
    pub custom_checks: Vec<String>,
    pub export_format: ExportFormat,
    pub colorized_output: bool,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            send_email_alerts: false,
            admin_email: None,
            ignored_paths: Vec::new(),
            custom_checks: Vec::new(),
            export_format: ExportFormat::Array,
            colorized_output: true,
        }
    }
}

/// Partial options; `Some` fields replace the corresponding config field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub send_email_alerts: Option<bool>,
    pub admin_email: Option<String>,
    pub ignored_paths: Option<Vec<String>>,
    pub custom_checks: Option<Vec<String>>,
    pub export_format: Option<ExportFormat>,
    pub colorized_output: Option<bool>,
}

impl DoctorConfig {
    /// Shallow merge: every field present in `overrides` wins.
    pub fn merge(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(v) = overrides.send_email_alerts {
            self.send_email_alerts = v;
        }
        if let Some(v) = &overrides.admin_email {
            self.admin_email = Some(v.clone());
        }
        if let Some(v) = &overrides.ignored_paths {
            self.ignored_paths = v.clone();
        }
        if let Some(v) = &overrides.custom_checks {
            self.custom_checks = v.clone();
        }
        if let Some(v) = overrides.export_format {
            self.export_format = v;
        }
        if let Some(v) = overrides.colorized_output {
            self.colorized_output = v;
        }
        self
    }

    /// Fill in the admin email from the environment.
    ///
    /// Only applies when no admin email is configured; doing so also turns
    /// email alerts on.
    pub fn with_env_fallback(mut self, admin_email_env: Option<String>) -> Self {
        let has_email = self
            .admin_email
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        if !has_email {
            if let Some(email) = admin_email_env.filter(|e| !e.trim().is_empty()) {
                debug!(admin_email = %email, "admin email taken from environment");
                self.admin_email = Some(email);
                self.send_email_alerts = true;
            }
        }
        self
    }

    /// Full resolution: defaults, settings file, caller overrides, env fallback.
    pub fn resolve(
        settings: &DoctorSettings,
        overrides: &ConfigOverrides,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        DoctorConfig::default()
            .merge(&settings.options)
            .merge(overrides)
            .with_env_fallback(env(ADMIN_EMAIL_ENV))
    }
}

/// Contents of `appdoctor.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DoctorSettings {
    #[serde(flatten)]
    pub options: ConfigOverrides,
    pub checks: CheckToggles,
    pub code_quality: CodeQualitySettings,
    pub log_analysis: LogAnalysisSettings,
    pub email: EmailSettings,
    pub probes: ProbeSettings,
    pub webhooks: WebhookSettings,
}

impl DoctorSettings {
    /// Parse settings from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load settings from a file that must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DoctorError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Load an explicit settings file, or `appdoctor.toml` from the app root
    /// when present, or fall back to defaults.
    pub fn discover(explicit: Option<&Path>, app_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = app_root.join(SETTINGS_FILE_NAME);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "using settings file from app root");
            return Self::load(&candidate);
        }
        Ok(Self::default())
    }

    /// Apply environment overrides to sections that support them.
    pub fn with_env_overrides(mut self, env: &dyn Fn(&str) -> Option<String>) -> Self {
        self.webhooks.apply_env(env);
        self
    }
}

/// Per-module enable flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckToggles {
    pub environment: bool,
    pub filesystem_permissions: bool,
    pub security: bool,
    pub database: bool,
    pub services: bool,
    pub logs: bool,
    pub code_quality: bool,
    pub dependencies: bool,
    pub schedule_queues: bool,
    pub version_consistency: bool,
}

impl Default for CheckToggles {
    fn default() -> Self {
        Self {
            environment: true,
            filesystem_permissions: true,
            security: true,
            database: true,
            services: true,
            logs: true,
            code_quality: true,
            dependencies: true,
            schedule_queues: true,
            version_consistency: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeQualitySettings {
    pub max_file_lines: usize,
    pub check_todo_comments: bool,
    pub check_debug_statements: bool,
    pub run_style_fixer: bool,
    pub run_static_analysis: bool,
}

impl Default for CodeQualitySettings {
    fn default() -> Self {
        Self {
            max_file_lines: 500,
            check_todo_comments: true,
            check_debug_statements: true,
            run_style_fixer: true,
            run_static_analysis: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogAnalysisSettings {
    /// How many trailing non-blank lines to inspect.
    pub lines_to_check: usize,
    /// A topical bucket is reported when its hit count exceeds this.
    pub issue_threshold: usize,
}

impl Default for LogAnalysisSettings {
    fn default() -> Self {
        Self {
            lines_to_check: 200,
            issue_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub subject_prefix: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            subject_prefix: "App Doctor Alert".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Upper bound for any single external call (process, db, cache, http, mail).
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub slack: SlackSettings,
    pub discord: DiscordSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub channel: String,
    pub username: String,
    pub icon_emoji: String,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            channel: "#general".to_string(),
            username: "App Doctor".to_string(),
            icon_emoji: ":stethoscope:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordSettings {
    pub enabled: bool,
    pub webhook_url: Option<String>,
}

impl WebhookSettings {
    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = env("APPDOCTOR_SLACK_ENABLED") {
            self.slack.enabled = parse_flag(&v);
        }
        if let Some(v) = env("APPDOCTOR_SLACK_WEBHOOK") {
            self.slack.webhook_url = Some(v);
        }
        if let Some(v) = env("APPDOCTOR_SLACK_CHANNEL") {
            self.slack.channel = v;
        }
        if let Some(v) = env("APPDOCTOR_DISCORD_ENABLED") {
            self.discord.enabled = parse_flag(&v);
        }
        if let Some(v) = env("APPDOCTOR_DISCORD_WEBHOOK") {
            self.discord.webhook_url = Some(v);
        }
    }
}

/// Framework-style boolean parsing (`true`, `1`, `on`, `yes`, `(true)`).
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes" | "(true)"
    )
}

/// Read a non-empty variable from the real process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DoctorConfig::default();
        assert!(!config.send_email_alerts);
        assert!(config.admin_email.is_none());
        assert_eq!(config.export_format, ExportFormat::Array);
        assert!(config.colorized_output);
    }

    #[test]
    fn test_merge_is_shallow_per_field() {
        let overrides = ConfigOverrides {
            export_format: Some(ExportFormat::Json),
            ignored_paths: Some(vec!["vendor".to_string()]),
            ..Default::default()
        };
        let config = DoctorConfig::default().merge(&overrides);
        assert_eq!(config.export_format, ExportFormat::Json);
        assert_eq!(config.ignored_paths, vec!["vendor".to_string()]);
        assert!(config.colorized_output);
    }

    #[test]
    fn test_env_fallback_enables_alerts() {
        let config = DoctorConfig::default().with_env_fallback(Some("ops@example.com".into()));
        assert_eq!(config.admin_email.as_deref(), Some("ops@example.com"));
        assert!(config.send_email_alerts);
    }

    #[test]
    fn test_env_fallback_keeps_explicit_email() {
        let overrides = ConfigOverrides {
            admin_email: Some("lead@example.com".to_string()),
            ..Default::default()
        };
        let config = DoctorConfig::default()
            .merge(&overrides)
            .with_env_fallback(Some("ops@example.com".into()));
        assert_eq!(config.admin_email.as_deref(), Some("lead@example.com"));
        assert!(!config.send_email_alerts);
    }

    #[test]
    fn test_resolve_applies_file_then_overrides() {
        let settings = DoctorSettings::from_toml(
            r#"
            export_format = "html"
            colorized_output = false
            "#,
        )
        .unwrap();
        let overrides = ConfigOverrides {
            colorized_output: Some(true),
            ..Default::default()
        };
        let config = DoctorConfig::resolve(&settings, &overrides, &env_from(&[]));
        assert_eq!(config.export_format, ExportFormat::Html);
        assert!(config.colorized_output);
    }

    #[test]
    fn test_settings_sections_parse() {
        let settings = DoctorSettings::from_toml(
            r#"
            ignored_paths = ["vendor", "node_modules"]

            [checks]
            logs = false

            [code_quality]
            max_file_lines = 300

            [log_analysis]
            lines_to_check = 50

            [webhooks.slack]
            enabled = true
            webhook_url = "https://hooks.slack.test/abc"
            "#,
        )
        .unwrap();
        assert!(!settings.checks.logs);
        assert!(settings.checks.security);
        assert_eq!(settings.code_quality.max_file_lines, 300);
        assert_eq!(settings.log_analysis.lines_to_check, 50);
        assert_eq!(settings.log_analysis.issue_threshold, 5);
        assert!(settings.webhooks.slack.enabled);
        assert_eq!(settings.webhooks.slack.channel, "#general");
        assert!(!settings.webhooks.discord.enabled);
    }

    #[test]
    fn test_malformed_settings_is_error() {
        let err = DoctorSettings::from_toml("export_format = [").unwrap_err();
        assert!(err.to_string().contains("settings parse error"));
    }

    #[test]
    fn test_webhook_env_overrides() {
        let settings = DoctorSettings::default().with_env_overrides(&env_from(&[
            ("APPDOCTOR_DISCORD_ENABLED", "true"),
            ("APPDOCTOR_DISCORD_WEBHOOK", "https://discord.test/hook"),
        ]));
        assert!(settings.webhooks.discord.enabled);
        assert_eq!(
            settings.webhooks.discord.webhook_url.as_deref(),
            Some("https://discord.test/hook")
        );
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("(true)"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_probe_timeout_floor() {
        let probes = ProbeSettings { timeout_secs: 0 };
        assert_eq!(probes.timeout(), Duration::from_secs(1));
    }
}

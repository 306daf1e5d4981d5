//! The diagnostic engine.
//!
//! [`Doctor::diagnose`] runs the check modules in fixed order, then the
//! custom checks, then the alert dispatchers. Everything after the starting
//! finding runs inside one guarded block: an `Err` or a panic escaping it
//! becomes a single "Diagnostic Process Error" finding and the run still
//! ends with the terminal "Diagnostics Complete" finding.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{error, info, info_span, Instrument};

use crate::alerts;
use crate::app::AppSnapshot;
use crate::checks::{self, CheckContext};
use crate::config::{DoctorConfig, DoctorSettings};
use crate::custom::{self, CustomCheck, CustomCheckRegistry, CustomFinding};
use crate::error::Result;
use crate::export::{self, ExportFormat, Report};
use crate::finding::{Finding, Findings, Level, Summary};
use crate::probes::Collaborators;

pub struct Doctor {
    config: DoctorConfig,
    settings: DoctorSettings,
    snapshot: AppSnapshot,
    collaborators: Collaborators,
    registry: CustomCheckRegistry,
    custom: Vec<(String, Arc<dyn CustomCheck>)>,
    findings: Findings,
}

impl Doctor {
    pub fn new(
        config: DoctorConfig,
        settings: DoctorSettings,
        snapshot: AppSnapshot,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            config,
            settings,
            snapshot,
            collaborators,
            registry: CustomCheckRegistry::new(),
            custom: Vec::new(),
            findings: Findings::new(),
        }
    }

    /// Named checks that `config.custom_checks` can select.
    pub fn with_registry(mut self, registry: CustomCheckRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a check that runs on every diagnose, after the configured ones.
    pub fn register_custom_check<F>(&mut self, name: impl Into<String>, check: F)
    where
        F: Fn(&Doctor) -> anyhow::Result<Option<CustomFinding>> + Send + Sync + 'static,
    {
        self.custom.push((name.into(), Arc::new(check)));
    }

    pub fn register_check(&mut self, name: impl Into<String>, check: Arc<dyn CustomCheck>) {
        self.custom.push((name.into(), check));
    }

    pub fn config(&self) -> &DoctorConfig {
        &self.config
    }

    pub fn settings(&self) -> &DoctorSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> &AppSnapshot {
        &self.snapshot
    }

    /// Findings of the last run, in insertion order.
    pub fn findings(&self) -> &[Finding] {
        self.findings.as_slice()
    }

    pub fn summary(&self) -> Summary {
        self.findings.summary()
    }

    /// Export the last run; `None` uses the configured format.
    pub fn results(&self, format: Option<ExportFormat>) -> Result<Report> {
        export::export(
            self.findings.as_slice(),
            format.unwrap_or(self.config.export_format),
        )
    }

    /// Like [`Doctor::results`] with a format name; unknown names fail with
    /// `DoctorError::UnsupportedFormat`.
    pub fn results_str(&self, format: &str) -> Result<Report> {
        self.results(Some(format.parse()?))
    }

    /// Run a full diagnosis, replacing the previous run's findings.
    pub async fn diagnose(&mut self) -> &[Finding] {
        let span = info_span!(
            "diagnose",
            app = %self.snapshot.layout.base().display(),
            env = %self.snapshot.environment_name(),
        );
        self.run_diagnostics().instrument(span).await;
        self.findings.as_slice()
    }

    async fn run_diagnostics(&mut self) {
        let start = Instant::now();
        info!("Starting diagnostics");

        self.findings.reset();
        self.findings.add(
            "App Doctor Starting Diagnostics",
            Level::Info,
            "Beginning comprehensive system check...",
        );

        let outcome = AssertUnwindSafe(self.guarded()).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(payload) => Some(custom::panic_reason(payload.as_ref())),
        };
        if let Some(reason) = failure {
            error!(error = %reason, "Diagnostic run aborted");
            self.findings.add(
                "Diagnostic Process Error",
                Level::Error,
                format!("An error occurred during diagnostics: {}", reason),
            );
        }

        let critical = self.findings.critical_issues();
        let total = self.findings.len();
        self.findings.add(
            "Diagnostics Complete",
            if critical > 0 { Level::Warning } else { Level::Ok },
            format!(
                "Found {} critical issues, {} total checks performed",
                critical, total
            ),
        );

        info!(
            findings = self.findings.len(),
            critical_issues = critical,
            duration_ms = start.elapsed().as_millis() as u64,
            "Diagnostics finished"
        );
    }

    async fn guarded(&mut self) -> anyhow::Result<()> {
        let ctx = CheckContext {
            config: &self.config,
            settings: &self.settings,
            snapshot: &self.snapshot,
            collaborators: &self.collaborators,
        };
        checks::run_all(&ctx, &mut self.findings).await?;

        let mut selected = self.registry.resolve(&self.config.custom_checks);
        selected.extend(self.custom.iter().cloned());
        if !selected.is_empty() {
            let found = custom::run_checks(self, &selected);
            info!(checks = selected.len(), findings = found.len(), "Custom checks finished");
            for finding in found {
                self.findings.push(finding);
            }
        }

        let critical = self.findings.critical_issues();
        if critical == 0 {
            return Ok(());
        }
        let timeout = self.settings.probes.timeout();

        if self.config.send_email_alerts {
            if let Some(to) = self.config.admin_email.as_deref() {
                let outcome = alerts::send_email_alert(
                    self.collaborators.mailer.as_ref(),
                    timeout,
                    to,
                    &self.settings.email.subject_prefix,
                    &self.snapshot,
                    self.findings.as_slice(),
                )
                .await;
                self.findings.push(outcome);
            }
        }

        let outcomes = alerts::dispatch_webhooks(
            self.collaborators.webhooks.as_ref(),
            timeout,
            &self.settings.webhooks,
            &self.snapshot,
            self.findings.as_slice(),
        )
        .await;
        for outcome in outcomes {
            self.findings.push(outcome);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Doctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doctor")
            .field("config", &self.config)
            .field("app", &self.snapshot.layout.base())
            .field("registry", &self.registry)
            .field("custom", &self.custom.len())
            .field("findings", &self.findings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppLayout, EnvSnapshot};
    use crate::config::CheckToggles;
    use crate::error::DoctorError;
    use crate::probes::fakes::FakeKit;

    /// An engine with every built-in module switched off.
    fn bare_doctor(kit: &FakeKit) -> Doctor {
        let mut settings = DoctorSettings::default();
        settings.checks = CheckToggles {
            environment: false,
            filesystem_permissions: false,
            security: false,
            database: false,
            services: false,
            logs: false,
            code_quality: false,
            dependencies: false,
            schedule_queues: false,
            version_consistency: false,
        };
        let snapshot = AppSnapshot::from_parts(
            AppLayout::new("/nonexistent/app"),
            EnvSnapshot::from_pairs([("APP_ENV", "production")]),
        );
        Doctor::new(
            DoctorConfig::default(),
            settings,
            snapshot,
            kit.collaborators(),
        )
    }

    #[tokio::test]
    async fn test_bare_run_brackets_findings() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        let findings = doctor.diagnose().await;

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].message, "App Doctor Starting Diagnostics");
        assert_eq!(findings[1].message, "Diagnostics Complete");
        assert_eq!(findings[1].level, Level::Ok);
        assert_eq!(
            findings[1].advice,
            "Found 0 critical issues, 1 total checks performed"
        );
    }

    #[tokio::test]
    async fn test_panicking_check_is_isolated() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        doctor.register_custom_check("boom", |_| panic!("custom exploded"));
        doctor.register_custom_check("fine", |_| {
            Ok(Some(CustomFinding::new("Still Ran", Level::Ok)))
        });

        let messages: Vec<_> = doctor
            .diagnose()
            .await
            .iter()
            .map(|f| f.message.clone())
            .collect();
        assert_eq!(
            messages,
            vec![
                "App Doctor Starting Diagnostics",
                "Custom Check Error",
                "Still Ran",
                "Diagnostics Complete",
            ]
        );
    }

    #[tokio::test]
    async fn test_critical_run_alerts_by_email() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        doctor.config.send_email_alerts = true;
        doctor.config.admin_email = Some("ops@example.com".to_string());
        doctor.register_custom_check("broken", |_| {
            Ok(Some(CustomFinding::new("Broken Thing", Level::Critical)))
        });

        doctor.diagnose().await;

        let sent = kit.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "App Doctor Alert: 1 Critical Issues Found");
        let last = doctor.findings().last().unwrap();
        assert_eq!(last.level, Level::Warning);
        assert_eq!(
            last.advice,
            "Found 1 critical issues, 3 total checks performed"
        );
        // Webhooks are disabled by default.
        assert!(kit.webhooks.requests().is_empty());
    }

    #[tokio::test]
    async fn test_email_needs_flag_and_address() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        doctor.config.admin_email = Some("ops@example.com".to_string());
        doctor.register_custom_check("broken", |_| {
            Ok(Some(CustomFinding::new("Broken Thing", Level::Error)))
        });
        doctor.diagnose().await;
        assert!(kit.mailer.sent().is_empty());

        doctor.config.send_email_alerts = true;
        doctor.config.admin_email = None;
        doctor.diagnose().await;
        assert!(kit.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_resets_findings() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        let first = doctor.diagnose().await.len();
        let second = doctor.diagnose().await.len();
        assert_eq!(first, second);
        assert_eq!(doctor.summary().total_checks, 2);
    }

    #[tokio::test]
    async fn test_results_formats() {
        let kit = FakeKit::healthy();
        let mut doctor = bare_doctor(&kit);
        doctor.diagnose().await;

        let report = doctor.results(None).unwrap();
        assert_eq!(report.as_findings().unwrap().len(), 2);
        let json = doctor.results_str("JSON").unwrap();
        assert!(json.as_rendered().unwrap().starts_with('['));
        assert!(matches!(
            doctor.results_str("xml"),
            Err(DoctorError::UnsupportedFormat(f)) if f == "xml"
        ));
    }
}

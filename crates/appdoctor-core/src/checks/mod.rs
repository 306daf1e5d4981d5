//! Built-in check modules and the context they run against.

pub mod code_quality;
pub mod database;
pub mod dependencies;
pub mod environment;
pub mod filesystem;
pub mod logs;
pub mod schedule;
pub mod security;
pub mod services;
pub mod versions;

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::AppSnapshot;
use crate::config::{CheckToggles, DoctorConfig, DoctorSettings};
use crate::error::Result;
use crate::finding::Findings;
use crate::probes::{bounded, Collaborators, ProcessOutput};

/// Built-in check modules, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckModule {
    /// Required `.env` keys, debug mode, app key, `.env` exposure.
    Environment,

    /// Writable directories, permission bits, ownership.
    FilesystemPermissions,

    /// Debug tooling, exposed files, dumps, HTTPS and cookie flags.
    Security,

    /// Default connection, live query, migrations and common tables.
    Database,

    /// Redis, cache round trip, queue, mail.
    Services,

    /// Tail of the application log.
    Logs,

    /// Style fixer, static analysis, source scans.
    CodeQuality,

    /// Composer manifest, lock file, validate, outdated.
    Dependencies,

    /// Scheduler definitions and queue workers.
    ScheduleQueues,

    /// Framework and runtime versions.
    VersionConsistency,
}

impl CheckModule {
    pub const ALL: [CheckModule; 10] = [
        CheckModule::Environment,
        CheckModule::FilesystemPermissions,
        CheckModule::Security,
        CheckModule::Database,
        CheckModule::Services,
        CheckModule::Logs,
        CheckModule::CodeQuality,
        CheckModule::Dependencies,
        CheckModule::ScheduleQueues,
        CheckModule::VersionConsistency,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CheckModule::Environment => "environment",
            CheckModule::FilesystemPermissions => "filesystem_permissions",
            CheckModule::Security => "security",
            CheckModule::Database => "database",
            CheckModule::Services => "services",
            CheckModule::Logs => "logs",
            CheckModule::CodeQuality => "code_quality",
            CheckModule::Dependencies => "dependencies",
            CheckModule::ScheduleQueues => "schedule_queues",
            CheckModule::VersionConsistency => "version_consistency",
        }
    }

    pub fn enabled(&self, toggles: &CheckToggles) -> bool {
        match self {
            CheckModule::Environment => toggles.environment,
            CheckModule::FilesystemPermissions => toggles.filesystem_permissions,
            CheckModule::Security => toggles.security,
            CheckModule::Database => toggles.database,
            CheckModule::Services => toggles.services,
            CheckModule::Logs => toggles.logs,
            CheckModule::CodeQuality => toggles.code_quality,
            CheckModule::Dependencies => toggles.dependencies,
            CheckModule::ScheduleQueues => toggles.schedule_queues,
            CheckModule::VersionConsistency => toggles.version_consistency,
        }
    }

    pub async fn run(&self, ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
        match self {
            CheckModule::Environment => environment::run(ctx, out).await,
            CheckModule::FilesystemPermissions => filesystem::run(ctx, out).await,
            CheckModule::Security => security::run(ctx, out).await,
            CheckModule::Database => database::run(ctx, out).await,
            CheckModule::Services => services::run(ctx, out).await,
            CheckModule::Logs => logs::run(ctx, out).await,
            CheckModule::CodeQuality => code_quality::run(ctx, out).await,
            CheckModule::Dependencies => dependencies::run(ctx, out).await,
            CheckModule::ScheduleQueues => schedule::run(ctx, out).await,
            CheckModule::VersionConsistency => versions::run(ctx, out).await,
        }
    }
}

/// Everything a check may read. Checks never touch process-wide state.
pub struct CheckContext<'a> {
    pub config: &'a DoctorConfig,
    pub settings: &'a DoctorSettings,
    pub snapshot: &'a AppSnapshot,
    pub collaborators: &'a Collaborators,
}

impl<'a> CheckContext<'a> {
    pub fn base(&self) -> &Path {
        self.snapshot.layout.base()
    }

    /// Per-probe timeout.
    pub fn timeout(&self) -> Duration {
        self.settings.probes.timeout()
    }

    /// Run an external tool in the application root under the probe timeout.
    pub async fn run_tool(&self, program: &str, args: &[&str]) -> Result<ProcessOutput> {
        let timeout = self.timeout();
        bounded(
            program,
            timeout,
            self.collaborators
                .process
                .run(program, args, self.base(), timeout),
        )
        .await
    }
}

/// Run every enabled module in order.
pub async fn run_all(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    for module in CheckModule::ALL {
        if !module.enabled(&ctx.settings.checks) {
            debug!(module = module.name(), "Skipping disabled check module");
            continue;
        }

        let start = Instant::now();
        let before = out.len();
        module.run(ctx, out).await?;

        info!(
            module = module.name(),
            findings = out.len() - before,
            duration_ms = start.elapsed().as_millis() as u64,
            "Check module finished"
        );
    }
    Ok(())
}

//! Composer manifest, lock file, `composer validate` and `composer outdated`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::finding::{Findings, Level};

use super::versions::php_version;
use super::CheckContext;

/// Packages whose staleness is raised to a warning.
const CORE_PACKAGES: &[&str] = &["laravel/framework", "php"];

/// The parts of `composer.json` the checks read.
#[derive(Debug, Default, Deserialize)]
pub struct ComposerManifest {
    #[serde(default)]
    pub require: BTreeMap<String, String>,
    #[serde(default, rename = "require-dev")]
    pub require_dev: BTreeMap<String, String>,
}

impl ComposerManifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Constraint from `require`, then `require-dev`.
    pub fn constraint(&self, package: &str) -> Option<&str> {
        self.require
            .get(package)
            .or_else(|| self.require_dev.get(package))
            .map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct OutdatedReport {
    #[serde(default)]
    installed: Vec<OutdatedPackage>,
}

#[derive(Debug, Deserialize)]
struct OutdatedPackage {
    name: String,
}

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let layout = &ctx.snapshot.layout;

    if !layout.composer_json().exists() {
        out.add(
            "composer.json Not Found",
            Level::Critical,
            "composer.json file is missing from project root",
        );
        return Ok(());
    }

    if !layout.composer_lock().exists() {
        out.add(
            "composer.lock Missing",
            Level::Error,
            "Run composer install to generate composer.lock file",
        );
    }

    if ctx.collaborators.process.exists("composer") {
        composer_validate(ctx, out).await;
        composer_outdated(ctx, out).await;
    } else {
        out.add(
            "Composer Not Found",
            Level::Info,
            "Install Composer to validate dependencies: https://getcomposer.org",
        );
    }

    check_constraints(ctx, out).await;

    out.add(
        "Composer Dependencies Check Complete",
        Level::Ok,
        "Composer dependencies validated successfully.",
    );
    Ok(())
}

async fn composer_validate(ctx: &CheckContext<'_>, out: &mut Findings) {
    match ctx
        .run_tool("composer", &["validate", "--no-check-publish"])
        .await
    {
        Ok(output) => {
            let combined = format!("{}{}", output.stdout, output.stderr);
            if combined.contains("is valid") {
                out.add(
                    "Composer Configuration Valid",
                    Level::Ok,
                    "composer.json is valid",
                );
            } else {
                out.add(
                    "Composer Configuration Issues",
                    Level::Warning,
                    format!("Composer validate found issues: {}", combined.trim()),
                );
            }
        }
        Err(e) => out.add(
            "Composer Validate Failed",
            Level::Warning,
            format!("Could not run composer validate: {}", e),
        ),
    }
}

/// Names of outdated packages reported by `composer outdated --format=json`.
fn parse_outdated(stdout: &str) -> anyhow::Result<Vec<String>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let report: OutdatedReport = serde_json::from_str(stdout)?;
    Ok(report.installed.into_iter().map(|p| p.name).collect())
}

async fn composer_outdated(ctx: &CheckContext<'_>, out: &mut Findings) {
    let result = match ctx.run_tool("composer", &["outdated", "--format=json"]).await {
        Ok(output) => parse_outdated(&output.stdout),
        Err(e) => Err(e.into()),
    };

    let outdated = match result {
        Ok(outdated) => outdated,
        Err(e) => {
            out.add(
                "Outdated Packages Check Failed",
                Level::Warning,
                format!("Could not check for outdated packages: {}", e),
            );
            return;
        }
    };

    if outdated.is_empty() {
        out.add(
            "All Packages Up to Date",
            Level::Ok,
            "No outdated packages found",
        );
        return;
    }

    let core: Vec<&str> = outdated
        .iter()
        .map(String::as_str)
        .filter(|name| CORE_PACKAGES.contains(name))
        .collect();

    out.add(
        "Outdated Packages Found",
        if core.is_empty() {
            Level::Info
        } else {
            Level::Warning
        },
        format!(
            "Found {} outdated packages. Run: composer outdated",
            outdated.len()
        ),
    );

    if !core.is_empty() {
        out.add(
            "Critical Packages Outdated",
            Level::Warning,
            format!("Critical packages need updating: {}", core.join(", ")),
        );
    }
}

/// Framework constraints that pin an unsupported major.
pub fn is_old_framework_constraint(constraint: &str) -> bool {
    constraint.contains("^6.") || constraint.contains("^7.")
}

async fn check_constraints(ctx: &CheckContext<'_>, out: &mut Findings) {
    let manifest = match ComposerManifest::load(&ctx.snapshot.layout.composer_json()) {
        Ok(manifest) => manifest,
        Err(e) => {
            out.add(
                "composer.json Not Parseable",
                Level::Warning,
                format!("Could not read composer.json: {}", e),
            );
            return;
        }
    };

    if manifest
        .constraint("laravel/framework")
        .is_some_and(is_old_framework_constraint)
    {
        out.add(
            "Old Laravel Version",
            Level::Warning,
            "Consider upgrading to a newer Laravel version for security and features",
        );
    }

    if let Some(required) = manifest.constraint("php") {
        let current = php_version(ctx).await;
        if current.is_none() {
            debug!("php interpreter not available for version info");
        }
        out.add(
            "PHP Version Info",
            Level::Info,
            format!(
                "Current PHP: {}, Required: {}",
                current.as_deref().unwrap_or("unknown"),
                required
            ),
        );
    }
}

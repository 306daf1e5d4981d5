//! Framework and runtime version consistency.

use regex::Regex;
use tracing::debug;

use crate::finding::{Findings, Level};

use super::dependencies::ComposerManifest;
use super::CheckContext;

/// Oldest framework major still considered supported.
const MIN_SUPPORTED_FRAMEWORK_MAJOR: u64 = 8;

/// Runtime support status for a `major.minor` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeSupport {
    EndOfLife,
    NearEndOfLife,
    Supported,
}

impl RuntimeSupport {
    pub fn classify(major: u64, minor: u64) -> Self {
        match (major, minor) {
            (7, 4) => RuntimeSupport::NearEndOfLife,
            v if v < (7, 4) => RuntimeSupport::EndOfLife,
            _ => RuntimeSupport::Supported,
        }
    }
}

/// Leading `major.minor` of a version string.
pub fn major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    Some((major, minor))
}

/// First integer in a composer constraint such as `^10.0` or `~9.5|^10`.
pub fn constraint_major(constraint: &str) -> Option<u64> {
    let digits: String = constraint
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Version printed by the PHP interpreter, if one is available.
pub(crate) async fn php_version(ctx: &CheckContext<'_>) -> Option<String> {
    match ctx.run_tool("php", &["-r", "echo PHP_VERSION;"]).await {
        Ok(output) if output.success() => {
            let version = output.stdout.trim();
            (!version.is_empty()).then(|| version.to_string())
        }
        Ok(output) => {
            debug!(status = ?output.status, "php version probe exited unsuccessfully");
            None
        }
        Err(e) => {
            debug!(error = %e, "php version probe failed");
            None
        }
    }
}

/// Framework version reported by `php artisan --version`.
async fn artisan_version(ctx: &CheckContext<'_>) -> anyhow::Result<Option<String>> {
    let pattern = Regex::new(r"Laravel Framework (\d+\.\d+\.\d+)")?;
    let output = match ctx.run_tool("php", &["artisan", "--version"]).await {
        Ok(output) => output,
        Err(e) => {
            debug!(error = %e, "artisan version probe failed");
            return Ok(None);
        }
    };
    Ok(pattern
        .captures(&output.stdout)
        .map(|caps| caps[1].to_string()))
}

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let artisan = artisan_version(ctx).await?;

    check_framework_consistency(ctx, artisan.as_deref(), out);
    check_runtime(ctx, out).await;

    if let Some(major) = artisan.as_deref().and_then(major_minor).map(|(m, _)| m) {
        if major < MIN_SUPPORTED_FRAMEWORK_MAJOR {
            out.add(
                "Laravel Version EOL",
                Level::Warning,
                format!(
                    "Laravel {}.x may be end of life. Check Laravel documentation for support status.",
                    major
                ),
            );
        }
    }

    out.add(
        "Version Consistency Check Complete",
        Level::Ok,
        "Version consistency validated successfully.",
    );
    Ok(())
}

fn check_framework_consistency(ctx: &CheckContext<'_>, artisan: Option<&str>, out: &mut Findings) {
    let Some(artisan) = artisan else {
        return;
    };
    let manifest = match ComposerManifest::load(&ctx.snapshot.layout.composer_json()) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!(error = %e, "composer.json unavailable for version comparison");
            return;
        }
    };
    let Some(required) = manifest.require.get("laravel/framework") else {
        return;
    };

    out.add(
        "Laravel Version Info",
        Level::Info,
        format!(
            "Artisan reports: {}, Composer requires: {}",
            artisan, required
        ),
    );

    let running = major_minor(artisan).map(|(m, _)| m);
    let declared = constraint_major(required);
    if let (Some(running), Some(declared)) = (running, declared) {
        if running != declared {
            out.add(
                "Laravel Version Mismatch",
                Level::Warning,
                format!(
                    "Installed framework {} does not match the composer constraint {}. Run: composer install",
                    artisan, required
                ),
            );
        }
    }
}

async fn check_runtime(ctx: &CheckContext<'_>, out: &mut Findings) {
    let Some(version) = php_version(ctx).await else {
        out.add(
            "PHP Version Unknown",
            Level::Info,
            "Could not run the php interpreter to determine its version",
        );
        return;
    };

    let Some((major, minor)) = major_minor(&version) else {
        out.add(
            "PHP Version Unknown",
            Level::Info,
            format!("Unrecognised PHP version string: {}", version),
        );
        return;
    };

    match RuntimeSupport::classify(major, minor) {
        RuntimeSupport::EndOfLife => out.add(
            "PHP Version End of Life",
            Level::Critical,
            format!(
                "PHP {}.{} is end of life. Upgrade to a supported version.",
                major, minor
            ),
        ),
        RuntimeSupport::NearEndOfLife => out.add(
            "PHP Version Near EOL",
            Level::Warning,
            "PHP 7.4 is approaching end of life. Consider upgrading to PHP 8.x",
        ),
        RuntimeSupport::Supported => out.add(
            "PHP Version Supported",
            Level::Ok,
            format!("PHP {} is currently supported", version),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{advice_of, level_of, messages, Harness};
    use crate::probes::fakes::{output, FakeKit, ScriptedProcessRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn harness_with(dir: &TempDir, process: ScriptedProcessRunner) -> Harness {
        let mut kit = FakeKit::healthy();
        kit.process = Arc::new(process);
        Harness::with_kit(dir.path(), &[], &kit)
    }

    #[tokio::test]
    async fn test_no_php_is_info_only() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new(dir.path(), &[]);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(
            messages(&out),
            vec!["PHP Version Unknown", "Version Consistency Check Complete"]
        );
    }

    #[tokio::test]
    async fn test_consistent_versions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"laravel/framework": "^10.10"}}"#,
        )
        .unwrap();
        let harness = harness_with(
            &dir,
            ScriptedProcessRunner::new()
                .on("php artisan --version", output(0, "Laravel Framework 10.48.4\n"))
                .on("php -r echo PHP_VERSION;", output(0, "8.2.7")),
        );
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            messages(&out),
            vec![
                "Laravel Version Info",
                "PHP Version Supported",
                "Version Consistency Check Complete",
            ]
        );
        assert_eq!(
            advice_of(&out, "Laravel Version Info").unwrap(),
            "Artisan reports: 10.48.4, Composer requires: ^10.10"
        );
    }

    #[tokio::test]
    async fn test_old_stack() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"laravel/framework": "^8.0"}}"#,
        )
        .unwrap();
        let harness = harness_with(
            &dir,
            ScriptedProcessRunner::new()
                .on("php artisan --version", output(0, "Laravel Framework 7.30.6"))
                .on("php -r echo PHP_VERSION;", output(0, "7.2.34")),
        );
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            level_of(&out, "Laravel Version Mismatch"),
            Some(Level::Warning)
        );
        assert_eq!(
            level_of(&out, "PHP Version End of Life"),
            Some(Level::Critical)
        );
        assert_eq!(
            advice_of(&out, "Laravel Version EOL").unwrap(),
            "Laravel 7.x may be end of life. Check Laravel documentation for support status."
        );
    }

    #[test]
    fn test_runtime_support_table() {
        assert_eq!(RuntimeSupport::classify(5, 6), RuntimeSupport::EndOfLife);
        assert_eq!(RuntimeSupport::classify(7, 0), RuntimeSupport::EndOfLife);
        assert_eq!(RuntimeSupport::classify(7, 3), RuntimeSupport::EndOfLife);
        assert_eq!(RuntimeSupport::classify(7, 4), RuntimeSupport::NearEndOfLife);
        assert_eq!(RuntimeSupport::classify(8, 0), RuntimeSupport::Supported);
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(major_minor("8.3.0-dev"), Some((8, 3)));
        assert_eq!(major_minor("8.2rc1"), Some((8, 2)));
        assert_eq!(major_minor("garbage"), None);
        assert_eq!(constraint_major("^10.0"), Some(10));
        assert_eq!(constraint_major("~9.5|^10"), Some(9));
        assert_eq!(constraint_major("*"), None);
    }
}

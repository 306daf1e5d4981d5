//! Production hardening: debug tooling, web-root exposure, dumps, cookies.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::parse_flag;
use crate::finding::{Findings, Level};

use super::CheckContext;

/// Files that expose source, configuration or tooling when served.
const EXPOSED_FILES: &[(&str, &str)] = &[
    (".git", "Git repository"),
    (".env", "Environment file"),
    (".DS_Store", "macOS system file"),
    ("Thumbs.db", "Windows thumbnail cache"),
    ("composer.json", "Composer configuration"),
    ("composer.lock", "Composer lock file"),
    ("package.json", "NPM configuration"),
    ("webpack.mix.js", "Laravel Mix configuration"),
    ("artisan", "Laravel Artisan command"),
    ("phpunit.xml", "PHPUnit configuration"),
    (".phpunit.result.cache", "PHPUnit cache"),
];

const BACKUP_PATTERNS: &[&str] = &["*.bak", "*.backup", "*.old", "*.orig", "*.tmp"];

const DUMP_PATTERNS: &[&str] = &[
    "*.sql",
    "*.dump",
    "*.zip",
    "*.tar.gz",
    "*.tar",
    "database.sqlite",
];

/// Development packages that should not ship to production.
const DEBUG_PACKAGES: &[(&str, &str)] = &[
    ("laravel/tinker", "Tinker"),
    ("spatie/laravel-ignition", "Ignition"),
    ("facade/ignition", "Ignition (Legacy)"),
];

/// Sessions longer than a day are reported.
const MAX_SESSION_LIFETIME_MINUTES: u64 = 1440;

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    check_debug_tools(ctx, out);
    check_exposed_files(ctx, out)?;
    check_dumps(ctx, out)?;
    check_transport_and_cookies(ctx, out);
    check_misconfigurations(ctx, out).await;

    out.add(
        "Security Check Complete",
        Level::Ok,
        "Security configurations validated successfully.",
    );
    Ok(())
}

fn check_debug_tools(ctx: &CheckContext<'_>, out: &mut Findings) {
    let snapshot = ctx.snapshot;
    if !snapshot.is_production() {
        return;
    }

    if snapshot.has_package("barryvdh/laravel-debugbar") && snapshot.debugbar_enabled() {
        out.add(
            "Laravel Debugbar Enabled in Production",
            Level::Critical,
            "Disable Debugbar in production: Set DEBUGBAR_ENABLED=false in .env",
        );
    }

    if snapshot.has_package("laravel/telescope") && snapshot.telescope_enabled() {
        out.add(
            "Laravel Telescope Enabled in Production",
            Level::Critical,
            "Disable Telescope in production or restrict access properly",
        );
    }

    for (package, name) in DEBUG_PACKAGES {
        if snapshot.has_package(package) {
            out.add(
                format!("{} Available in Production", name),
                Level::Warning,
                format!(
                    "Consider removing or securing {} in production environment",
                    name
                ),
            );
        }
    }
}

/// Paths under `dir` matching `pattern`, sorted.
fn glob_in(dir: &Path, pattern: &str) -> anyhow::Result<Vec<PathBuf>> {
    let Some(dir_str) = dir.to_str() else {
        return Ok(Vec::new());
    };
    let full = format!("{}/{}", glob::Pattern::escape(dir_str), pattern);
    let mut paths: Vec<PathBuf> = glob::glob(&full)?.filter_map(|p| p.ok()).collect();
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn check_exposed_files(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let public = ctx.snapshot.layout.public_path();
    if !public.is_dir() {
        debug!(path = %public.display(), "no public directory");
        return Ok(());
    }

    for (file, description) in EXPOSED_FILES {
        if public.join(file).exists() {
            out.add(
                format!("Exposed Sensitive File: {}", file),
                Level::Critical,
                format!(
                    "Remove {} from public directory: rm -rf public/{}",
                    description, file
                ),
            );
        }
    }

    for pattern in BACKUP_PATTERNS {
        for path in glob_in(&public, pattern)? {
            let name = file_name(&path);
            out.add(
                format!("Backup File in Public Directory: {}", name),
                Level::Warning,
                format!("Remove backup file from public directory: rm public/{}", name),
            );
        }
    }
    Ok(())
}

fn check_dumps(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let layout = &ctx.snapshot.layout;
    let locations = [
        (layout.public_path(), "public directory", Level::Critical),
        (layout.base().to_path_buf(), "project root", Level::Warning),
    ];

    for (dir, location, level) in locations {
        let mut seen = BTreeSet::new();
        for pattern in DUMP_PATTERNS {
            for path in glob_in(&dir, pattern)? {
                if !seen.insert(path.clone()) {
                    continue;
                }
                let name = file_name(&path);
                out.add(
                    format!("Potentially Sensitive File: {}", name),
                    level,
                    format!("Review and secure or remove {} from {}", name, location),
                );
            }
        }
    }
    Ok(())
}

fn check_transport_and_cookies(ctx: &CheckContext<'_>, out: &mut Findings) {
    let snapshot = ctx.snapshot;
    if !snapshot.is_production() {
        return;
    }

    if let Some(url) = snapshot.env.get("APP_URL") {
        if !url.starts_with("https://") {
            out.add(
                "HTTPS Not Enforced",
                Level::Warning,
                "Use HTTPS in production: Update APP_URL to use https:// protocol",
            );
        }
    }

    if !snapshot.session_secure() {
        out.add(
            "Session Cookies Not Secure",
            Level::Warning,
            "Enable secure session cookies: Set SESSION_SECURE_COOKIE=true",
        );
    }

    if !snapshot.session_http_only() {
        out.add(
            "Session Cookies Not HTTP Only",
            Level::Warning,
            "Enable HTTP-only session cookies for XSS protection",
        );
    }
}

/// Interpret an `ini_get('display_errors')` value.
pub fn display_errors_enabled(raw: &str) -> bool {
    let value = raw.trim().to_ascii_lowercase();
    parse_flag(&value) || value == "stdout" || value == "stderr"
}

async fn check_misconfigurations(ctx: &CheckContext<'_>, out: &mut Findings) {
    if ctx.snapshot.is_production() {
        match ctx
            .run_tool("php", &["-r", "echo ini_get('display_errors');"])
            .await
        {
            Ok(output) if output.success() && display_errors_enabled(&output.stdout) => {
                out.add(
                    "Error Display Enabled in Production",
                    Level::Warning,
                    "Disable error display in production PHP configuration",
                );
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "display_errors probe skipped"),
        }
    }

    if ctx.snapshot.session_lifetime() > MAX_SESSION_LIFETIME_MINUTES {
        out.add(
            "Long Session Lifetime",
            Level::Info,
            "Consider shorter session lifetime for better security",
        );
    }

    let http_kernel = ctx.snapshot.layout.base_path("app/Http/Kernel.php");
    if let Ok(source) = std::fs::read_to_string(&http_kernel) {
        if !source.contains("'web' =>") && !source.contains("\"web\" =>") {
            out.add(
                "Web Middleware Group Missing",
                Level::Warning,
                "Ensure web middleware group includes CSRF protection",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{advice_of, level_of, Harness};
    use crate::probes::fakes::{output, FakeKit, ScriptedProcessRunner};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(base: &Path, rel: &str, content: &str) {
        let path = base.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_exposed_files_and_backups_in_public() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "public/.env", "APP_KEY=x");
        write(dir.path(), "public/index.php.bak", "<?php");
        let harness = Harness::new(dir.path(), &[("APP_ENV", "local")]);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            level_of(&out, "Exposed Sensitive File: .env"),
            Some(Level::Critical)
        );
        assert_eq!(
            advice_of(&out, "Exposed Sensitive File: .env").unwrap(),
            "Remove Environment file from public directory: rm -rf public/.env"
        );
        assert_eq!(
            level_of(&out, "Backup File in Public Directory: index.php.bak"),
            Some(Level::Warning)
        );
    }

    #[tokio::test]
    async fn test_dump_severity_depends_on_location() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "public/backup.sql", "--");
        write(dir.path(), "dump.sql", "--");
        let harness = Harness::new(dir.path(), &[]);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            level_of(&out, "Potentially Sensitive File: backup.sql"),
            Some(Level::Critical)
        );
        assert_eq!(
            level_of(&out, "Potentially Sensitive File: dump.sql"),
            Some(Level::Warning)
        );
    }

    #[tokio::test]
    async fn test_sqlite_file_reported_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "public/database.sqlite", "");
        let harness = Harness::new(dir.path(), &[]);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        let hits = out
            .iter()
            .filter(|f| f.message == "Potentially Sensitive File: database.sqlite")
            .count();
        assert_eq!(hits, 1);
    }

    #[tokio::test]
    async fn test_production_transport_and_debug_tools() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "composer.lock",
            r#"{"packages":[{"name":"laravel/telescope"},{"name":"laravel/tinker"}]}"#,
        );
        let harness = Harness::new(
            dir.path(),
            &[("APP_ENV", "production"), ("APP_URL", "http://shop.test")],
        );
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            level_of(&out, "Laravel Telescope Enabled in Production"),
            Some(Level::Critical)
        );
        assert_eq!(
            level_of(&out, "Tinker Available in Production"),
            Some(Level::Warning)
        );
        assert_eq!(level_of(&out, "HTTPS Not Enforced"), Some(Level::Warning));
        assert_eq!(
            level_of(&out, "Session Cookies Not Secure"),
            Some(Level::Warning)
        );
    }

    #[tokio::test]
    async fn test_display_errors_probe() {
        let dir = TempDir::new().unwrap();
        let mut kit = FakeKit::healthy();
        kit.process = Arc::new(
            ScriptedProcessRunner::new()
                .on("php -r echo ini_get('display_errors');", output(0, "1")),
        );
        let harness = Harness::with_kit(dir.path(), &[("APP_ENV", "production")], &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            level_of(&out, "Error Display Enabled in Production"),
            Some(Level::Warning)
        );
    }

    #[tokio::test]
    async fn test_local_environment_skips_production_rules() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new(
            dir.path(),
            &[("APP_ENV", "local"), ("APP_URL", "http://localhost")],
        );
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert!(level_of(&out, "HTTPS Not Enforced").is_none());
        assert!(level_of(&out, "Session Cookies Not Secure").is_none());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_display_errors_values() {
        assert!(display_errors_enabled("1"));
        assert!(display_errors_enabled("On"));
        assert!(display_errors_enabled("stderr"));
        assert!(!display_errors_enabled(""));
        assert!(!display_errors_enabled("0"));
    }
}

//! `.env` presence, required keys and production hardening.

use std::path::Path;

use crate::finding::{Findings, Level};

use super::filesystem::is_writable;
use super::CheckContext;

/// Keys every deployment must define, with the advice shown when missing.
pub const REQUIRED_KEYS: &[(&str, &str)] = &[
    ("APP_ENV", "Application environment not set"),
    (
        "APP_KEY",
        "Application key not set - run php artisan key:generate",
    ),
    ("APP_DEBUG", "Debug mode not configured"),
    ("APP_URL", "Application URL not set"),
    ("DB_CONNECTION", "Database connection not configured"),
    ("DB_HOST", "Database host not set"),
    ("DB_DATABASE", "Database name not set"),
    ("CACHE_DRIVER", "Cache driver not configured"),
    ("SESSION_DRIVER", "Session driver not configured"),
    ("QUEUE_CONNECTION", "Queue connection not configured"),
];

/// Secret-bearing files that must never sit under `public/`.
const SECRET_FILES: &[&str] = &[
    ".env.backup",
    ".env.example",
    ".env.local",
    ".env.testing",
    "database.sqlite",
    "storage/database.sqlite",
];

/// Development artefacts that should not be web-servable.
const DEVELOPMENT_FILES: &[&str] = &[
    ".git",
    ".DS_Store",
    "composer.json",
    "composer.lock",
    "package.json",
    "webpack.mix.js",
    "artisan",
];

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let env_path = ctx.snapshot.layout.env_file();

    if !env_path.exists() {
        out.add(
            ".env File Missing",
            Level::Critical,
            "Create a .env file in your project root. Copy from .env.example if available.",
        );
        return Ok(());
    }

    if std::fs::File::open(&env_path).is_err() {
        out.add(
            ".env File Not Readable",
            Level::Error,
            "Ensure the .env file has proper read permissions.",
        );
        return Ok(());
    }

    for (key, advice) in REQUIRED_KEYS {
        if ctx.snapshot.env.get(key).is_none() {
            out.add(
                format!("Missing Environment Variable: {}", key),
                Level::Error,
                *advice,
            );
        }
    }

    check_production_security(ctx, &env_path, out);
    check_public_exposure(ctx, out);

    out.add(
        "Environment Configuration Check Complete",
        Level::Ok,
        "Environment variables validated successfully.",
    );
    Ok(())
}

/// A key is weak when empty, a bare `base64:` prefix, or under 32 characters.
pub fn is_weak_app_key(key: Option<&str>) -> bool {
    match key {
        None => true,
        Some(k) => k == "base64:" || k.chars().count() < 32,
    }
}

fn check_production_security(ctx: &CheckContext<'_>, env_path: &Path, out: &mut Findings) {
    let env = &ctx.snapshot.env;
    let production = ctx.snapshot.is_production();

    if production && env.flag("APP_DEBUG") {
        out.add(
            "Debug Mode Enabled in Production",
            Level::Critical,
            "Set APP_DEBUG=false in production environment for security.",
        );
    }

    if is_weak_app_key(env.get("APP_KEY")) {
        out.add(
            "Weak or Missing Application Key",
            Level::Critical,
            "Generate a strong application key using: php artisan key:generate",
        );
    }

    if !production {
        return;
    }

    if let Some(mode) = permission_bits(env_path) {
        if mode != 0o600 && mode != 0o644 {
            out.add(
                "Insecure .env File Permissions",
                Level::Warning,
                "Set .env file permissions to 600 or 644 for security: chmod 600 .env",
            );
        }
    }

    if is_writable(env_path) {
        out.add(
            ".env File is Writable in Production",
            Level::Warning,
            "Consider making .env read-only in production: chmod 444 .env",
        );
    }
}

fn check_public_exposure(ctx: &CheckContext<'_>, out: &mut Findings) {
    let public = ctx.snapshot.layout.public_path();

    for file in SECRET_FILES {
        if public.join(file).exists() {
            out.add(
                format!("Sensitive File in Public Directory: {}", file),
                Level::Critical,
                format!("Remove {} from the public directory immediately.", file),
            );
        }
    }

    for file in DEVELOPMENT_FILES {
        if public.join(file).exists() {
            out.add(
                format!("Development File in Public Directory: {}", file),
                Level::Warning,
                format!(
                    "Remove {} from public directory or block access via .htaccess",
                    file
                ),
            );
        }
    }
}

/// Permission bits (including setuid/setgid/sticky) of `path`; `None` off unix.
#[cfg(unix)]
pub(crate) fn permission_bits(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub(crate) fn permission_bits(_path: &Path) -> Option<u32> {
    None
}

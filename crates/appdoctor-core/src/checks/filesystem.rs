//! Writable directories, permission bits and ownership.

use std::path::{Path, PathBuf};

use crate::app::Platform;
use crate::finding::{Findings, Level};

use super::environment::permission_bits;
use super::CheckContext;

/// Directories the framework writes to at runtime.
pub const WRITABLE_DIRECTORIES: &[&str] = &[
    "storage",
    "storage/app",
    "storage/framework",
    "storage/framework/cache",
    "storage/framework/sessions",
    "storage/framework/views",
    "storage/logs",
    "bootstrap/cache",
];

/// Accounts web servers commonly run as, in lookup order.
pub const WEB_SERVER_USERS: &[&str] = &["www-data", "apache", "nginx", "httpd"];

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let layout = &ctx.snapshot.layout;

    for dir in WRITABLE_DIRECTORIES {
        let full = layout.base_path(dir);

        if !full.exists() {
            out.add(
                format!("Missing Directory: {}", dir),
                Level::Error,
                format!("Create the missing directory: mkdir -p {}", dir),
            );
            continue;
        }

        if !is_writable(&full) {
            out.add(
                format!("Directory Not Writable: {}", dir),
                Level::Error,
                format!(
                    "Make directory writable: chmod 755 {} or chmod 775 {}",
                    dir, dir
                ),
            );
        }

        if permission_bits(&full).is_some_and(|mode| mode & 0o777 == 0o777) {
            out.add(
                format!("Insecure Directory Permissions: {}", dir),
                Level::Warning,
                format!(
                    "Directory has 777 permissions. Use 755 or 775 instead: chmod 755 {}",
                    dir
                ),
            );
        }
    }

    let log_file = layout.log_file();
    if log_file.exists() && !is_writable(&log_file) {
        out.add(
            "Laravel Log File Not Writable",
            Level::Error,
            "Make log file writable: chmod 664 storage/logs/laravel.log",
        );
    }

    if ctx.snapshot.platform == Platform::Unix {
        let paths = [
            layout.env_file(),
            layout.composer_json(),
            layout.storage_path(),
            layout.base_path("bootstrap/cache"),
        ];
        check_ownership(&paths, out);
    }

    out.add(
        "Filesystem Permissions Check Complete",
        Level::Ok,
        "File system permissions validated successfully.",
    );
    Ok(())
}

/// Whether the effective user may write `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};
    access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
pub fn is_writable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(unix)]
fn check_ownership(paths: &[PathBuf], out: &mut Findings) {
    use std::os::unix::fs::MetadataExt;

    use nix::unistd::{geteuid, Uid, User};

    let Some(current) = User::from_uid(geteuid()).ok().flatten() else {
        return;
    };
    let web_user = WEB_SERVER_USERS
        .iter()
        .find(|name| User::from_name(name).ok().flatten().is_some())
        .copied();

    for path in paths {
        let Ok(meta) = std::fs::metadata(path) else {
            continue;
        };
        let Some(owner) = User::from_uid(Uid::from_raw(meta.uid())).ok().flatten() else {
            continue;
        };

        if let Some(reason) = ownership_issue(&owner.name, &current.name, web_user) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            out.add(format!("File Ownership Issue: {}", name), Level::Warning, reason);
        }
    }
}

#[cfg(not(unix))]
fn check_ownership(_paths: &[PathBuf], _out: &mut Findings) {}

/// Advice when `owner` is neither the current user nor the web server user.
///
/// Without a detectable web server account nothing is reported.
pub fn ownership_issue(owner: &str, current: &str, web_user: Option<&str>) -> Option<String> {
    if owner == current {
        return None;
    }
    let web_user = web_user?;
    if owner == web_user {
        return None;
    }
    Some(format!(
        "File owned by {}, consider changing to {} or {}",
        owner, current, web_user
    ))
}

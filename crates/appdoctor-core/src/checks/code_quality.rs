//! External linters plus TODO, debug-statement and file-size scans of `app/`.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CodeQualitySettings;
use crate::finding::{Findings, Level};

use super::CheckContext;

/// Call patterns that should not ship.
const DEBUG_STATEMENTS: &[&str] = &["dd(", "dump(", "var_dump(", "print_r(", "error_log("];

const LARGE_FILES_LISTED: usize = 5;

/// An external analysis tool looked up in `vendor/bin` and then on `PATH`.
struct Tool {
    name: &'static str,
    binary: &'static str,
    args: &'static [&'static str],
}

const STYLE_FIXER: Tool = Tool {
    name: "PHP CS Fixer",
    binary: "php-cs-fixer",
    args: &["fix", "--dry-run", "--format=json", "app/"],
};

const STATIC_ANALYSER: Tool = Tool {
    name: "PHPStan",
    binary: "phpstan",
    args: &["analyse", "--no-progress", "--error-format=json", "app/"],
};

#[derive(Debug, Deserialize)]
struct FixerReport {
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyserReport {
    totals: AnalyserTotals,
}

#[derive(Debug, Deserialize)]
struct AnalyserTotals {
    #[serde(default)]
    errors: u64,
    #[serde(default)]
    file_errors: u64,
}

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let settings = &ctx.settings.code_quality;

    if settings.run_style_fixer {
        check_style_fixer(ctx, out).await;
    }
    if settings.run_static_analysis {
        check_static_analysis(ctx, out).await;
    }

    let app_dir = ctx.snapshot.layout.app_path();
    if app_dir.is_dir() {
        let ignored = ignore_matcher(ctx.base(), &ctx.config.ignored_paths);
        let regex_settings = settings.clone();
        let scan =
            tokio::task::spawn_blocking(move || scan_sources(&app_dir, ignored, &regex_settings))
                .await??;
        report_scan(&scan, settings, out);
    } else {
        debug!(path = %app_dir.display(), "no app directory, source scans skipped");
    }

    out.add(
        "Code Quality Check Complete",
        Level::Ok,
        "Code quality analysis completed successfully.",
    );
    Ok(())
}

/// First candidate that exists: `vendor/bin/<tool>`, its `.bat` twin, then `PATH`.
fn locate_tool(ctx: &CheckContext<'_>, binary: &str) -> Option<String> {
    let vendor = ctx.snapshot.layout.base_path("vendor/bin");
    let candidates = [
        vendor.join(binary).to_string_lossy().to_string(),
        vendor
            .join(format!("{}.bat", binary))
            .to_string_lossy()
            .to_string(),
        binary.to_string(),
    ];
    candidates
        .into_iter()
        .find(|c| Path::new(c).is_file() || ctx.collaborators.process.exists(c))
}

async fn run_tool_json<T: for<'de> Deserialize<'de>>(
    ctx: &CheckContext<'_>,
    program: &str,
    tool: &Tool,
) -> anyhow::Result<T> {
    let output = ctx.run_tool(program, tool.args).await?;
    if output.stdout.trim().is_empty() {
        anyhow::bail!("{} produced no output (exit status {:?})", tool.binary, output.status);
    }
    Ok(serde_json::from_str(&output.stdout)?)
}

async fn check_style_fixer(ctx: &CheckContext<'_>, out: &mut Findings) {
    let tool = &STYLE_FIXER;
    let Some(program) = locate_tool(ctx, tool.binary) else {
        out.add(
            "PHP CS Fixer Not Found",
            Level::Info,
            "Install PHP CS Fixer for code style checking: composer require --dev friendsofphp/php-cs-fixer",
        );
        return;
    };

    match run_tool_json::<FixerReport>(ctx, &program, tool).await {
        Ok(report) if !report.files.is_empty() => out.add(
            "Code Style Issues Found",
            Level::Warning,
            format!(
                "PHP CS Fixer found {} files with style issues. Run: php-cs-fixer fix",
                report.files.len()
            ),
        ),
        Ok(_) => out.add(
            "Code Style Check Passed",
            Level::Ok,
            "No code style issues found by PHP CS Fixer",
        ),
        Err(e) => {
            warn!(tool = tool.name, error = %e, "tool run failed");
            out.add(
                "PHP CS Fixer Check Failed",
                Level::Warning,
                format!("Could not run PHP CS Fixer: {}", e),
            );
        }
    }
}

async fn check_static_analysis(ctx: &CheckContext<'_>, out: &mut Findings) {
    let tool = &STATIC_ANALYSER;
    let Some(program) = locate_tool(ctx, tool.binary) else {
        out.add(
            "PHPStan Not Found",
            Level::Info,
            "Install PHPStan for static analysis: composer require --dev phpstan/phpstan or nunomaduro/larastan",
        );
        return;
    };

    match run_tool_json::<AnalyserReport>(ctx, &program, tool).await {
        Ok(report) if report.totals.errors > 0 => out.add(
            "Static Analysis Issues Found",
            Level::Warning,
            format!(
                "PHPStan found {} issues in {} files. Run: phpstan analyse",
                report.totals.errors, report.totals.file_errors
            ),
        ),
        Ok(_) => out.add(
            "Static Analysis Check Passed",
            Level::Ok,
            "No static analysis issues found by PHPStan",
        ),
        Err(e) => {
            warn!(tool = tool.name, error = %e, "tool run failed");
            out.add(
                "PHPStan Check Failed",
                Level::Warning,
                format!("Could not run PHPStan: {}", e),
            );
        }
    }
}

/// Matcher for `ignored_paths`, interpreted as gitignore lines relative to
/// the application root.
fn ignore_matcher(base: &Path, ignored_paths: &[String]) -> Gitignore {
    let mut builder = GitignoreBuilder::new(base);
    for pattern in ignored_paths {
        if let Err(e) = builder.add_line(None, pattern) {
            warn!(pattern = %pattern, error = %e, "ignoring invalid ignored_paths entry");
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "cannot build ignored_paths matcher");
        Gitignore::empty()
    })
}

/// Totals from one pass over the PHP sources.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SourceScan {
    pub files: usize,
    pub todo: usize,
    pub fixme: usize,
    /// Debug call patterns found, in `DEBUG_STATEMENTS` order.
    pub debug_statements: Vec<&'static str>,
    /// Path relative to `app/` and line count, in walk order.
    pub large_files: Vec<(String, usize)>,
}

fn debug_statement_regex(statement: &str) -> Result<Regex, regex::Error> {
    let name = statement.trim_end_matches('(');
    Regex::new(&format!(r"\b{}\(", regex::escape(name)))
}

/// Walk `*.php` under `app_dir` in file-name order.
pub fn scan_sources(
    app_dir: &Path,
    ignored: Gitignore,
    settings: &CodeQualitySettings,
) -> anyhow::Result<SourceScan> {
    let patterns = DEBUG_STATEMENTS
        .iter()
        .map(|s| Ok((*s, debug_statement_regex(s)?)))
        .collect::<Result<Vec<_>, regex::Error>>()?;

    let walker = WalkBuilder::new(app_dir)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !ignored.matched(entry.path(), is_dir).is_ignore()
        })
        .build();

    let mut scan = SourceScan::default();
    let mut found = vec![false; patterns.len()];

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_some_and(|t| t.is_file())
            || path.extension().and_then(|e| e.to_str()) != Some("php")
        {
            continue;
        }

        let Ok(raw) = std::fs::read(path) else {
            debug!(path = %path.display(), "skipping unreadable file");
            continue;
        };
        let content = String::from_utf8_lossy(&raw);
        scan.files += 1;

        if settings.check_todo_comments {
            let upper = content.to_uppercase();
            scan.todo += upper.matches("TODO").count();
            scan.fixme += upper.matches("FIXME").count();
        }

        if settings.check_debug_statements {
            for (i, (_, regex)) in patterns.iter().enumerate() {
                if !found[i] && regex.is_match(&content) {
                    found[i] = true;
                }
            }
        }

        let lines = content.lines().count();
        if lines > settings.max_file_lines {
            scan.large_files.push((relative(app_dir, path), lines));
        }
    }

    scan.debug_statements = patterns
        .iter()
        .zip(found)
        .filter(|(_, hit)| *hit)
        .map(|((statement, _), _)| *statement)
        .collect();
    Ok(scan)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_string()
}

fn report_scan(scan: &SourceScan, settings: &CodeQualitySettings, out: &mut Findings) {
    if scan.todo > 0 || scan.fixme > 0 {
        out.add(
            "TODO/FIXME Comments Found",
            Level::Info,
            format!(
                "Found {} TODO and {} FIXME comments in code",
                scan.todo, scan.fixme
            ),
        );
    }

    if !scan.debug_statements.is_empty() {
        out.add(
            "Debug Statements Found",
            Level::Warning,
            format!(
                "Found debug statements in code: {}",
                scan.debug_statements.join(", ")
            ),
        );
    }

    if !scan.large_files.is_empty() {
        let listed = scan
            .large_files
            .iter()
            .take(LARGE_FILES_LISTED)
            .map(|(file, lines)| format!("{} ({} lines)", file, lines))
            .collect::<Vec<_>>()
            .join(", ");
        out.add(
            "Large Files Found",
            Level::Info,
            format!(
                "Consider refactoring files over {} lines: {}",
                settings.max_file_lines, listed
            ),
        );
    }
}

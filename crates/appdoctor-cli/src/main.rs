//! appdoctor - self-diagnostics for Laravel-style PHP applications
//!
//! Runs every check module against an application tree and prints the
//! findings. Exit status: 0 when no error/critical findings were recorded,
//! 1 when some were, 2 when the run could not start.

mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use tracing::{error, info, Level};

use appdoctor_core::config::process_env;
use appdoctor_core::{
    init_tracing, AppSnapshot, Collaborators, ConfigOverrides, Doctor, DoctorConfig,
    DoctorSettings, ExportFormat, Report,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Console,
    Json,
    Html,
}

impl OutputFormat {
    /// Format used for `--export`; console output is exported as JSON.
    fn export_format(self) -> ExportFormat {
        match self {
            OutputFormat::Console | OutputFormat::Json => ExportFormat::Json,
            OutputFormat::Html => ExportFormat::Html,
        }
    }
}

#[derive(Parser)]
#[command(name = "appdoctor")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run comprehensive application diagnostics", long_about = None)]
struct Cli {
    /// Application root to inspect
    #[arg(short, long, default_value = ".")]
    path: PathBuf,

    /// Settings file (default: appdoctor.toml in the application root)
    #[arg(short, long, env = "APPDOCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Console)]
    format: OutputFormat,

    /// Export results to a file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Send email alerts for critical issues
    #[arg(long)]
    email: bool,

    /// Disable colorized output
    #[arg(long)]
    no_color: bool,

    /// Show advice, details and timestamps for every finding
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    init_tracing(cli.log_json, level);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{:#}", e), "appdoctor failed to start");
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the run was healthy.
async fn run(cli: &Cli) -> Result<bool> {
    let base = std::fs::canonicalize(&cli.path)
        .with_context(|| format!("Application root {} not found", cli.path.display()))?;

    let settings = DoctorSettings::discover(cli.config.as_deref(), &base)
        .context("Failed to load settings")?
        .with_env_overrides(&process_env);

    let overrides = ConfigOverrides {
        send_email_alerts: cli.email.then_some(true),
        colorized_output: cli.no_color.then_some(false),
        ..ConfigOverrides::default()
    };
    let config = DoctorConfig::resolve(&settings, &overrides, &process_env);
    if !config.colorized_output {
        colored::control::set_override(false);
    }

    let snapshot = AppSnapshot::capture(base.clone(), &process_env);
    let collaborators = Collaborators::production(&snapshot, &settings)
        .context("Failed to initialise probes")?;

    if cli.format == OutputFormat::Console {
        println!(
            "{}\n",
            "\u{1fa7a} App Doctor - Starting Diagnostics...".cyan()
        );
    }

    let mut doctor = Doctor::new(config, settings, snapshot, collaborators);
    doctor.diagnose().await;
    let summary = doctor.summary();

    match cli.format {
        OutputFormat::Console => {
            print!("{}", output::render(doctor.findings(), &summary, cli.verbose));
        }
        OutputFormat::Json => println!("{}", rendered(&doctor, ExportFormat::Json)?),
        OutputFormat::Html => println!("{}", rendered(&doctor, ExportFormat::Html)?),
    }

    if let Some(path) = &cli.export {
        match export_results(&doctor, path, cli.format.export_format()) {
            Ok(()) => {
                info!(path = %path.display(), "results exported");
                if cli.format == OutputFormat::Console {
                    println!("\u{2705} Results exported to: {}", path.display());
                }
            }
            Err(e) => eprintln!("\u{274c} Failed to export results: {:#}", e),
        }
    }

    Ok(summary.is_healthy())
}

fn rendered(doctor: &Doctor, format: ExportFormat) -> Result<String> {
    match doctor.results(Some(format))? {
        Report::Rendered(text) => Ok(text),
        Report::Findings(findings) => Ok(serde_json::to_string_pretty(&findings)?),
    }
}

fn export_results(doctor: &Doctor, path: &Path, format: ExportFormat) -> Result<()> {
    let content = rendered(doctor, format)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["appdoctor"]).unwrap();
        assert_eq!(cli.path, PathBuf::from("."));
        assert_eq!(cli.format, OutputFormat::Console);
        assert!(!cli.email);
        assert!(cli.export.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "appdoctor",
            "--path",
            "/srv/app",
            "--format",
            "html",
            "--export",
            "reports/doctor.html",
            "--email",
            "--no-color",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Html);
        assert!(cli.email && cli.no_color);
        assert_eq!(cli.format.export_format(), ExportFormat::Html);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["appdoctor", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_console_exports_json() {
        assert_eq!(OutputFormat::Console.export_format(), ExportFormat::Json);
    }

    #[tokio::test]
    async fn test_export_creates_parent_directories() {
        use appdoctor_core::probes::fakes::FakeKit;

        let dir = tempfile::TempDir::new().unwrap();
        let kit = FakeKit::healthy();
        let mut doctor = Doctor::new(
            DoctorConfig::default(),
            DoctorSettings::default(),
            AppSnapshot::capture(dir.path(), &|_| None),
            kit.collaborators(),
        );
        doctor.diagnose().await;

        let target = dir.path().join("reports/nested/doctor.json");
        export_results(&doctor, &target, ExportFormat::Json).unwrap();
        let written = std::fs::read_to_string(&target).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), doctor.findings().len());
    }
}

//! Result exporters: raw findings, pretty JSON and a standalone HTML report.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DoctorError, Result};
use crate::finding::{Finding, Level, Summary};

/// Output format for [`export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Array,
    Json,
    Html,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Array => "array",
            ExportFormat::Json => "json",
            ExportFormat::Html => "html",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = DoctorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "array" => Ok(ExportFormat::Array),
            "json" => Ok(ExportFormat::Json),
            "html" => Ok(ExportFormat::Html),
            other => Err(DoctorError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// An exported result set.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// The ordered findings, unserialised.
    Findings(Vec<Finding>),
    /// A rendered document (JSON or HTML).
    Rendered(String),
}

impl Report {
    pub fn as_findings(&self) -> Option<&[Finding]> {
        match self {
            Report::Findings(f) => Some(f),
            Report::Rendered(_) => None,
        }
    }

    pub fn as_rendered(&self) -> Option<&str> {
        match self {
            Report::Findings(_) => None,
            Report::Rendered(s) => Some(s),
        }
    }
}

/// Export `findings` in the requested format.
pub fn export(findings: &[Finding], format: ExportFormat) -> Result<Report> {
    match format {
        ExportFormat::Array => Ok(Report::Findings(findings.to_vec())),
        ExportFormat::Json => Ok(Report::Rendered(to_json(findings)?)),
        ExportFormat::Html => Ok(Report::Rendered(to_html(findings))),
    }
}

pub fn to_json(findings: &[Finding]) -> Result<String> {
    Ok(serde_json::to_string_pretty(findings)?)
}

/// Escape text for interpolation into HTML element bodies and attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 2rem; color: #222; }
h1 { margin-bottom: 0.25rem; }
.summary { display: grid; grid-template-columns: repeat(auto-fit, minmax(120px, 1fr)); gap: 0.75rem; margin: 1.5rem 0; }
.stat { border-radius: 6px; padding: 0.75rem; background: #f4f4f4; }
.stat .value { font-size: 1.6rem; font-weight: bold; }
.finding { border-left: 4px solid #999; padding: 0.5rem 1rem; margin-bottom: 0.75rem; background: #fafafa; }
.finding .meta { font-size: 0.8rem; color: #666; }
.finding .advice { margin: 0.25rem 0; }
.level-ok { border-color: #2e7d32; }
.level-info { border-color: #1565c0; }
.level-warning { border-color: #f9a825; }
.level-error { border-color: #c62828; }
.level-critical { border-color: #6a1b9a; }
.stat.level-ok .value { color: #2e7d32; }
.stat.level-info .value { color: #1565c0; }
.stat.level-warning .value { color: #f9a825; }
.stat.level-error .value { color: #c62828; }
.stat.level-critical .value { color: #6a1b9a; }
"#;

/// Render a self-contained HTML report with a summary grid and one block
/// per finding.
pub fn to_html(findings: &[Finding]) -> String {
    let summary = Summary::from_findings(findings);
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>App Doctor Report</title>\n<style>");
    html.push_str(STYLE);
    html.push_str("</style>\n</head>\n<body>\n<h1>App Doctor Report</h1>\n");

    html.push_str("<div class=\"summary\">\n");
    push_stat(&mut html, "Total Checks", summary.total_checks, "total");
    push_stat(
        &mut html,
        "Critical Issues",
        summary.critical_issues,
        if summary.critical_issues > 0 {
            "level-critical"
        } else {
            "level-ok"
        },
    );
    for level in Level::ALL {
        let class = format!("level-{}", level.as_str());
        push_stat(&mut html, &capitalize(level.as_str()), summary.count(level), &class);
    }
    html.push_str("</div>\n");

    html.push_str("<div class=\"findings\">\n");
    for finding in findings {
        let _ = writeln!(
            html,
            "<div class=\"finding level-{}\">",
            finding.level.as_str()
        );
        let _ = writeln!(html, "<h3>{}</h3>", escape_html(&finding.message));
        if !finding.advice.is_empty() {
            let _ = writeln!(
                html,
                "<p class=\"advice\">{}</p>",
                escape_html(&finding.advice)
            );
        }
        let _ = writeln!(
            html,
            "<p class=\"meta\">{} &middot; {}</p>",
            escape_html(&finding.level.as_str().to_uppercase()),
            escape_html(&finding.timestamp.to_rfc3339())
        );
        html.push_str("</div>\n");
    }
    html.push_str("</div>\n</body>\n</html>\n");
    html
}

fn push_stat(html: &mut String, label: &str, value: usize, class: &str) {
    let _ = writeln!(
        html,
        "<div class=\"stat {}\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>",
        escape_html(class),
        escape_html(label),
        value
    );
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

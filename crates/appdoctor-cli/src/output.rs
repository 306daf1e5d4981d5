//! Console rendering of a diagnostic run.

use chrono::SecondsFormat;
use colored::{ColoredString, Colorize};

use appdoctor_core::{Finding, Level, Summary};

fn paint(text: &str, level: Level) -> ColoredString {
    match level {
        Level::Ok => text.green(),
        Level::Info => text.cyan(),
        Level::Warning => text.yellow(),
        Level::Error => text.red(),
        Level::Critical => text.magenta(),
    }
}

fn icon(level: Level) -> &'static str {
    match level {
        Level::Ok => "\u{2705}",
        Level::Info => "\u{2139}\u{fe0f}",
        Level::Warning => "\u{26a0}\u{fe0f}",
        Level::Error => "\u{274c}",
        Level::Critical => "\u{1f6a8}",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Summary block, one entry per finding, then the verdict.
///
/// Without `verbose`, `ok` findings are listed by message only.
pub fn render(findings: &[Finding], summary: &Summary, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&render_summary(summary));
    output.push('\n');

    output.push_str(&format!("{}\n", "\u{1f4cb} Detailed Results:".bold()));
    output.push_str(&format!("{}\n", "=".repeat(60)));
    for finding in findings {
        output.push_str(&render_finding(finding, verbose));
    }

    output.push('\n');
    output.push_str(&render_verdict(summary));
    output
}

fn render_summary(summary: &Summary) -> String {
    let mut output = String::new();
    output.push_str(&format!("{}\n", "\u{1f4ca} Summary:".bold()));
    output.push_str(&format!("{}\n", "-".repeat(40)));
    output.push_str(&format!("Total Checks: {}\n", summary.total_checks));

    let critical = summary.critical_issues.to_string();
    let critical_level = if summary.critical_issues > 0 {
        Level::Critical
    } else {
        Level::Ok
    };
    output.push_str(&format!(
        "Critical Issues: {}\n",
        paint(&critical, critical_level)
    ));

    for level in Level::ALL {
        let count = summary.count(level);
        if count > 0 {
            output.push_str(&format!(
                "{}: {}\n",
                capitalize(level.as_str()),
                paint(&count.to_string(), level)
            ));
        }
    }
    output
}

fn render_finding(finding: &Finding, verbose: bool) -> String {
    let level = finding.level;
    let mut output = format!(
        "{} [{}] {}\n",
        icon(level),
        paint(&level.as_str().to_uppercase(), level),
        finding.message
    );

    if level == Level::Ok && !verbose {
        return output;
    }

    if !finding.advice.is_empty() {
        output.push_str(&format!("   \u{1f4a1} {}\n", finding.advice));
    }
    if verbose {
        for (key, value) in &finding.details {
            output.push_str(&format!("   {} {}: {}\n", "\u{2022}".dimmed(), key, value));
        }
        output.push_str(&format!(
            "   \u{1f552} {}\n",
            finding
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true)
        ));
    }
    output.push('\n');
    output
}

fn render_verdict(summary: &Summary) -> String {
    if summary.critical_issues > 0 {
        format!(
            "{}\n{}\n",
            format!(
                "\u{274c} Diagnostics completed with {} critical issues found.",
                summary.critical_issues
            )
            .red()
            .bold(),
            "Please review and address the issues above.".yellow()
        )
    } else {
        format!(
            "{}\n",
            "\u{2705} All diagnostics passed successfully!".green().bold()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_render_lists_summary_and_findings() {
        plain();
        let findings = vec![
            Finding::new("Cache System Working (redis)", Level::Ok)
                .with_advice("Cache read/write operations successful"),
            Finding::new(".env File Missing", Level::Critical).with_advice("Create a .env file"),
        ];
        let summary = Summary::from_findings(&findings);
        let text = render(&findings, &summary, false);

        assert!(text.contains("Total Checks: 2\n"));
        assert!(text.contains("Critical Issues: 1\n"));
        assert!(text.contains("Ok: 1\n"));
        assert!(text.contains("Critical: 1\n"));
        assert!(!text.contains("Warning:"));
        assert!(text.contains("[CRITICAL] .env File Missing\n"));
        assert!(text.contains("Create a .env file"));
        // ok advice only shows in verbose mode
        assert!(!text.contains("Cache read/write operations successful"));
        assert!(text.contains("Diagnostics completed with 1 critical issues found."));
    }

    #[test]
    fn test_clean_run_verdict() {
        plain();
        let findings = vec![Finding::new("Diagnostics Complete", Level::Ok)];
        let summary = Summary::from_findings(&findings);
        let text = render(&findings, &summary, true);
        assert!(text.contains("All diagnostics passed successfully!"));
        assert!(text.contains("\u{1f552} "));
    }
}

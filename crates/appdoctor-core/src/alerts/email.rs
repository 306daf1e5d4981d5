//! Plain-text email alert to the configured admin address.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::app::AppSnapshot;
use crate::finding::{Finding, Level};
use crate::probes::{bounded, Mailer};

use super::critical_findings;

pub fn subject(prefix: &str, critical_issues: usize) -> String {
    format!("{}: {} Critical Issues Found", prefix, critical_issues)
}

/// Body listing every error/critical finding.
pub fn body(snapshot: &AppSnapshot, findings: &[&Finding], now: DateTime<Utc>) -> String {
    let mut body = String::from("App Doctor has detected critical issues in your application:\n\n");
    body.push_str(&format!("Server: {}\n", snapshot.server_name));
    body.push_str(&format!("Environment: {}\n", snapshot.environment_name()));
    body.push_str(&format!("Timestamp: {}\n\n", now.format("%Y-%m-%d %H:%M:%S")));
    body.push_str("Critical Issues Found:\n");
    body.push_str(&"=".repeat(50));
    body.push_str("\n\n");

    for finding in findings {
        body.push_str(&format!("LEVEL: {}\n", finding.level.as_str().to_uppercase()));
        body.push_str(&format!("MESSAGE: {}\n", finding.message));
        body.push_str(&format!("ADVICE: {}\n", finding.advice));
        body.push_str(&format!(
            "TIME: {}\n",
            finding
                .timestamp
                .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
        ));
        body.push_str(&"-".repeat(30));
        body.push_str("\n\n");
    }

    body.push_str("Please review and address these issues promptly.\n\n");
    body.push_str("This alert was generated by App Doctor.");
    body
}

/// Send the alert to `to` and describe the outcome as a finding.
pub async fn send_email_alert(
    mailer: &dyn Mailer,
    timeout: Duration,
    to: &str,
    subject_prefix: &str,
    snapshot: &AppSnapshot,
    findings: &[Finding],
) -> Finding {
    let critical = critical_findings(findings);
    let subject = subject(subject_prefix, critical.len());
    let body = body(snapshot, &critical, Utc::now());

    match bounded("email alert", timeout, mailer.send(to, &subject, &body)).await {
        Ok(()) => {
            info!(to, issues = critical.len(), "email alert sent");
            Finding::new("Email Alert Sent", Level::Info)
                .with_advice(format!("Critical issues alert sent to {}", to))
        }
        Err(e) => {
            warn!(to, error = %e, "email alert failed");
            Finding::new("Email Alert Failed", Level::Warning)
                .with_advice(format!("Could not send email alert: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppLayout, EnvSnapshot};
    use crate::probes::fakes::RecordingMailer;
    use chrono::TimeZone;

    fn snapshot() -> AppSnapshot {
        AppSnapshot::from_parts(
            AppLayout::new("/srv/app"),
            EnvSnapshot::from_pairs([("APP_ENV", "production")]),
        )
        .with_server_name("web-01")
    }

    fn findings() -> Vec<Finding> {
        vec![
            Finding::new("All good", Level::Ok),
            Finding::new(".env File Missing", Level::Critical).with_advice("Create a .env file"),
            Finding::new("Directory Not Writable: storage", Level::Error),
        ]
    }

    #[test]
    fn test_body_lists_only_critical_findings() {
        let all = findings();
        let critical = critical_findings(&all);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let text = body(&snapshot(), &critical, now);

        assert!(text.contains("Server: web-01\n"));
        assert!(text.contains("Environment: production\n"));
        assert!(text.contains("Timestamp: 2024-05-01 12:00:00\n"));
        assert!(text.contains("LEVEL: CRITICAL\nMESSAGE: .env File Missing\nADVICE: Create a .env file\n"));
        assert!(text.contains("LEVEL: ERROR\nMESSAGE: Directory Not Writable: storage\n"));
        assert!(!text.contains("All good"));
    }

    #[tokio::test]
    async fn test_send_records_outcome() {
        let mailer = RecordingMailer::new();
        let finding = send_email_alert(
            &mailer,
            Duration::from_secs(5),
            "ops@example.com",
            "App Doctor Alert",
            &snapshot(),
            &findings(),
        )
        .await;

        assert_eq!(finding.message, "Email Alert Sent");
        assert_eq!(finding.level, Level::Info);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@example.com");
        assert_eq!(sent[0].subject, "App Doctor Alert: 2 Critical Issues Found");
    }

    #[tokio::test]
    async fn test_failure_is_warning() {
        let mailer = RecordingMailer::failing("sendmail: connection refused");
        let finding = send_email_alert(
            &mailer,
            Duration::from_secs(5),
            "ops@example.com",
            "App Doctor Alert",
            &snapshot(),
            &findings(),
        )
        .await;
        assert_eq!(finding.message, "Email Alert Failed");
        assert_eq!(finding.level, Level::Warning);
        assert!(finding.advice.contains("connection refused"));
    }
}

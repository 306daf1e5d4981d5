//! Outbound notifications sent when a run records critical issues.

pub mod email;
pub mod webhook;

use crate::finding::Finding;

pub use email::send_email_alert;
pub use webhook::dispatch_webhooks;

/// Findings that count toward `critical_issues`, in recorded order.
pub fn critical_findings(findings: &[Finding]) -> Vec<&Finding> {
    findings.iter().filter(|f| f.level.is_critical()).collect()
}

/// Up to `limit` findings, most severe first; ties keep their recorded order.
pub fn most_severe<'a>(findings: &[&'a Finding], limit: usize) -> Vec<&'a Finding> {
    let mut sorted = findings.to_vec();
    sorted.sort_by(|a, b| b.level.cmp(&a.level));
    sorted.truncate(limit);
    sorted
}

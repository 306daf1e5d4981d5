//! Slack and Discord webhook notifications.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::app::AppSnapshot;
use crate::config::{SlackSettings, WebhookSettings};
use crate::finding::{Finding, Level};
use crate::probes::{bounded, WebhookClient};

use super::{critical_findings, most_severe};

/// Findings rendered as attachments/embeds per message.
const MAX_ITEMS: usize = 5;

const DISCORD_RED: u32 = 15158332;
const DISCORD_YELLOW: u32 = 16776960;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Slack,
    Discord,
}

impl Target {
    pub fn name(&self) -> &'static str {
        match self {
            Target::Slack => "Slack",
            Target::Discord => "Discord",
        }
    }
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn slack_payload(
    settings: &SlackSettings,
    snapshot: &AppSnapshot,
    critical: &[&Finding],
    now: DateTime<Utc>,
) -> Value {
    let text = format!(
        "\u{1f6a8} *App Doctor Alert*\nServer: `{}`\nEnvironment: `{}`\nCritical Issues Found: `{}`\nTime: `{}`",
        snapshot.server_name,
        snapshot.environment_name(),
        critical.len(),
        now.format("%Y-%m-%d %H:%M:%S"),
    );

    let attachments: Vec<Value> = most_severe(critical, MAX_ITEMS)
        .into_iter()
        .map(|f| {
            json!({
                "color": if f.level == Level::Critical { "danger" } else { "warning" },
                "title": f.message,
                "text": f.advice,
                "footer": "App Doctor",
                "ts": f.timestamp.timestamp(),
                "fields": [{
                    "title": "Level",
                    "value": f.level.as_str().to_uppercase(),
                    "short": true,
                }],
            })
        })
        .collect();

    json!({
        "channel": settings.channel,
        "username": settings.username,
        "icon_emoji": settings.icon_emoji,
        "text": text,
        "attachments": attachments,
    })
}

pub fn discord_payload(snapshot: &AppSnapshot, critical: &[&Finding]) -> Value {
    let content = format!(
        "\u{1f6a8} **App Doctor Alert**\n**Server:** `{}`\n**Environment:** `{}`\n**Critical Issues:** `{}`",
        snapshot.server_name,
        snapshot.environment_name(),
        critical.len(),
    );

    let embeds: Vec<Value> = most_severe(critical, MAX_ITEMS)
        .into_iter()
        .map(|f| {
            json!({
                "title": f.message,
                "description": f.advice,
                "color": if f.level == Level::Critical { DISCORD_RED } else { DISCORD_YELLOW },
                "footer": { "text": format!("App Doctor | {}", f.level.as_str().to_uppercase()) },
                "timestamp": iso(&f.timestamp),
            })
        })
        .collect();

    json!({ "content": content, "embeds": embeds })
}

async fn deliver(
    client: &dyn WebhookClient,
    timeout: Duration,
    target: Target,
    url: &str,
    payload: &Value,
) -> Finding {
    let name = target.name();
    match bounded("webhook", timeout, client.post_json(url, payload)).await {
        Ok(response) if response.is_success() => {
            info!(target = name, status = response.status, "webhook notification sent");
            Finding::new(format!("{} Notification Sent", name), Level::Info)
                .with_advice(format!("Critical issues notification sent to {}", name))
        }
        Ok(response) => {
            warn!(target = name, status = response.status, "webhook rejected notification");
            Finding::new(format!("{} Notification Failed", name), Level::Warning).with_advice(
                format!(
                    "Failed to send {} notification: HTTP {} {}",
                    name,
                    response.status,
                    response.body.trim()
                ),
            )
        }
        Err(e) => {
            warn!(target = name, error = %e, "webhook delivery error");
            Finding::new(format!("{} Notification Error", name), Level::Warning)
                .with_advice(format!("Error sending {} notification: {}", name, e))
        }
    }
}

fn target_url(enabled: bool, url: Option<&str>) -> Option<&str> {
    if !enabled {
        return None;
    }
    url.map(str::trim).filter(|u| !u.is_empty())
}

/// Notify every enabled target; one outcome finding per attempted target.
///
/// Disabled targets or targets without a URL produce no request and no
/// finding.
pub async fn dispatch_webhooks(
    client: &dyn WebhookClient,
    timeout: Duration,
    settings: &WebhookSettings,
    snapshot: &AppSnapshot,
    findings: &[Finding],
) -> Vec<Finding> {
    let critical = critical_findings(findings);
    let mut outcomes = Vec::new();

    match target_url(settings.slack.enabled, settings.slack.webhook_url.as_deref()) {
        Some(url) => {
            let payload = slack_payload(&settings.slack, snapshot, &critical, Utc::now());
            outcomes.push(deliver(client, timeout, Target::Slack, url, &payload).await);
        }
        None => debug!("slack notifications disabled"),
    }

    match target_url(
        settings.discord.enabled,
        settings.discord.webhook_url.as_deref(),
    ) {
        Some(url) => {
            let payload = discord_payload(snapshot, &critical);
            outcomes.push(deliver(client, timeout, Target::Discord, url, &payload).await);
        }
        None => debug!("discord notifications disabled"),
    }

    outcomes
}

//! Webhook delivery through the reqwest adapter against a mock server.

use std::time::Duration;

use appdoctor_core::alerts::dispatch_webhooks;
use appdoctor_core::config::{DiscordSettings, SlackSettings, WebhookSettings};
use appdoctor_core::probes::http::ReqwestWebhookClient;
use appdoctor_core::{AppLayout, AppSnapshot, EnvSnapshot, Finding, Level};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn snapshot() -> AppSnapshot {
    AppSnapshot::from_parts(
        AppLayout::new("/srv/app"),
        EnvSnapshot::from_pairs([("APP_ENV", "production")]),
    )
    .with_server_name("web-01")
}

fn findings() -> Vec<Finding> {
    vec![
        Finding::new("Database Connection 'mysql' Failed", Level::Critical)
            .with_advice("Cannot connect to database: connection refused"),
        Finding::new("Redis Connection Working", Level::Ok),
    ]
}

fn slack_only(url: String) -> WebhookSettings {
    WebhookSettings {
        slack: SlackSettings {
            enabled: true,
            webhook_url: Some(url),
            channel: "#ops".to_string(),
            ..SlackSettings::default()
        },
        discord: DiscordSettings::default(),
    }
}

#[tokio::test]
async fn test_slack_delivery_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/T000"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "channel": "#ops",
            "attachments": [{
                "title": "Database Connection 'mysql' Failed",
                "color": "danger",
            }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let client = ReqwestWebhookClient::new(Duration::from_secs(5)).unwrap();
    let outcomes = dispatch_webhooks(
        &client,
        Duration::from_secs(5),
        &slack_only(format!("{}/services/T000", server.uri())),
        &snapshot(),
        &findings(),
    )
    .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].message, "Slack Notification Sent");
    assert_eq!(outcomes[0].level, Level::Info);
}

#[tokio::test]
async fn test_rejected_delivery_is_warning() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Webhook"))
        .expect(1)
        .mount(&server)
        .await;

    let settings = WebhookSettings {
        slack: SlackSettings::default(),
        discord: DiscordSettings {
            enabled: true,
            webhook_url: Some(format!("{}/api/webhooks/1", server.uri())),
        },
    };
    let client = ReqwestWebhookClient::new(Duration::from_secs(5)).unwrap();
    let outcomes = dispatch_webhooks(
        &client,
        Duration::from_secs(5),
        &settings,
        &snapshot(),
        &findings(),
    )
    .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].message, "Discord Notification Failed");
    assert_eq!(outcomes[0].level, Level::Warning);
    assert!(outcomes[0].advice.contains("Unknown Webhook"));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = ReqwestWebhookClient::new(Duration::from_millis(200)).unwrap();
    let outcomes = dispatch_webhooks(
        &client,
        Duration::from_millis(200),
        &slack_only(format!("{}/services/T000", server.uri())),
        &snapshot(),
        &findings(),
    )
    .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].message, "Slack Notification Error");
    assert_eq!(outcomes[0].level, Level::Warning);
}

use crate::domain::alert::Alert;
use crate::domain::model::Destination;
use crate::domain::ports::Notifier;
use crate::utils::error::{MonitorError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Posts alerts as embeds to chat webhook URLs.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn payload(alert: &Alert) -> Value {
        let mut embed = json!({
            "title": alert.title,
            "description": alert.description,
            "color": alert.color,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(url) = &alert.url {
            embed["url"] = json!(url);
        }
        if let Some(thumbnail) = &alert.thumbnail {
            embed["thumbnail"] = json!({ "url": thumbnail });
        }
        if !alert.fields.is_empty() {
            embed["fields"] = json!(alert.fields);
        }

        json!({ "embeds": [embed] })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, destination: &Destination, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(destination.as_str())
            .json(&Self::payload(alert))
            .send()
            .await
            .map_err(|e| MonitorError::Dispatch {
                destination: destination.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::Dispatch {
                destination: destination.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        tracing::debug!("Delivered {:?} alert to {}", alert.kind, destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_payload_shape() {
        let alert = Alert::milestone("Comic", "https://tumblbug.com/comic", 2_000_000, 2_100_000)
            .with_thumbnail(Some("https://img/cover.png".to_string()));
        let payload = WebhookNotifier::payload(&alert);
        let embed = &payload["embeds"][0];

        assert_eq!(embed["title"], "🎉 Comic reached 2,000,000원!");
        assert_eq!(embed["url"], "https://tumblbug.com/comic");
        assert_eq!(embed["thumbnail"]["url"], "https://img/cover.png");
        assert_eq!(embed["color"], 0x2ECC71);
        assert!(embed.get("fields").is_none());
        assert!(embed["timestamp"].is_string());
    }

    #[test]
    fn test_started_payload_has_link_field() {
        let payload = WebhookNotifier::payload(&Alert::monitoring_started("https://tumblbug.com/comic", 1_000));
        let embed = &payload["embeds"][0];

        assert_eq!(embed["description"], "Initial amount: 1,000원");
        assert_eq!(embed["fields"][0]["value"], "https://tumblbug.com/comic");
        assert!(embed.get("url").is_none());
    }

    #[tokio::test]
    async fn test_send_posts_embed() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .body_contains("Monitoring started");
            then.status(204);
        });

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        notifier
            .send(
                &Destination::new(server.url("/hook")),
                &Alert::monitoring_started("https://tumblbug.com/comic", 5),
            )
            .await
            .unwrap();

        hook.assert();
    }

    #[tokio::test]
    async fn test_non_success_status_is_dispatch_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(404).body("Unknown Webhook");
        });

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        let err = notifier
            .send(
                &Destination::new(server.url("/hook")),
                &Alert::monitoring_started("https://tumblbug.com/comic", 5),
            )
            .await
            .unwrap_err();

        match err {
            MonitorError::Dispatch { message, .. } => assert!(message.contains("Unknown Webhook")),
            other => panic!("unexpected error: {other}"),
        }
    }
}

use crate::connector::USER_ID_HEADER;
use anyhow::{Context, Result};
use events::{NotificationEvent, Severity};
use reqwest::Client;
use serde_json::{json, Value};

/// Calls the JSON endpoints that sit next to the stream.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sends a notification to `user_id`, which is delivered to every stream
    /// that user has open.
    pub async fn send_notification(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        severity: Severity,
    ) -> Result<NotificationEvent> {
        let url = format!("{}/notifications", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(USER_ID_HEADER, user_id)
            .json(&json!({
                "title": title,
                "message": message,
                "severity": severity,
            }))
            .send()
            .await
            .context("Failed to send notification")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            anyhow::bail!("Failed to send notification: {} - Response: {}", status, body);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse notification response")?;

        serde_json::from_value(body["data"].clone()).context("No notification in response")
    }
}

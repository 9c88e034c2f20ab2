//! Run notifications via an optional webhook.
//!
//! The receiving endpoint's dialect is unknown, so the payload is tried in
//! known shapes (chat-embed style, then plain-text style) and the first 2xx
//! wins, with a generic envelope as the last resort.

use std::time::Duration;

use chrono::Local;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::BackupConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

const COLOR_FAILURE: u32 = 0x00FF_0000;
const COLOR_SUCCESS: u32 = 0x0000_FF00;

/// Chat-embed payload (Discord-compatible).
pub fn payload_embed(title: &str, message: &str, is_error: bool, timestamp: &str) -> Value {
    json!({
        "embeds": [{
            "title": title,
            "description": message,
            "color": if is_error { COLOR_FAILURE } else { COLOR_SUCCESS },
            "footer": { "text": format!("tenback - {timestamp}") },
        }]
    })
}

/// Plain-text payload (Slack-compatible).
pub fn payload_text(title: &str, message: &str) -> Value {
    json!({ "text": format!("*{title}*\n{message}") })
}

/// Generic fallback envelope.
pub fn payload_generic(title: &str, message: &str, is_error: bool, timestamp: &str) -> Value {
    json!({
        "title": title,
        "message": message,
        "is_error": is_error,
        "timestamp": timestamp,
    })
}

/// Sends one aggregate notification, respecting the success/failure gating
/// flags. Delivery failures are logged, never propagated: notification is
/// best-effort and must not change the run outcome.
pub async fn send_webhook(config: &BackupConfig, title: &str, message: &str, is_error: bool) {
    let url = config.webhook_url.trim();
    if url.is_empty() {
        return;
    }
    if !is_error && !config.webhook_on_success {
        return;
    }
    if is_error && !config.webhook_on_failure {
        return;
    }

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let attempts = [
        payload_embed(title, message, is_error, &timestamp),
        payload_text(title, message),
        payload_generic(title, message, is_error, &timestamp),
    ];

    let client = reqwest::Client::new();
    for payload in &attempts {
        match client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("webhook notification delivered");
                return;
            }
            Ok(response) => {
                debug!(status = response.status().as_u16(), "webhook payload rejected");
            }
            Err(err) => {
                debug!(%err, "webhook attempt failed");
            }
        }
    }
    warn!("webhook notification could not be delivered");
}

//! Optional webhook notification.
//!
//! Run summaries are POSTed as JSON to a configured endpoint. Notification
//! is an ops convenience: failures are logged and never change the outcome
//! of the run that produced them.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire a run-summary event at the webhook. Best-effort.
pub async fn send(url: &str, event: &str, timestamp: &str, status: &str, detail: &str) {
    let body = json!({
        "event": event,
        "timestamp": timestamp,
        "status": status,
        "detail": detail,
    });

    let client = match reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "could not build notification client");
            return;
        }
    };

    match client.post(url).json(&body).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(event = event, "notification delivered");
        }
        Ok(response) => {
            warn!(event = event, status = %response.status(), "notification rejected");
        }
        Err(e) => {
            warn!(event = event, error = %e, "notification failed");
        }
    }
}

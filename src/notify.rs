// src/notify.rs

use async_trait::async_trait;
use serde_json::json;

use crate::models::request::RequestCategory;
use crate::roles::Role;

/// Events pushed to the staff channel.
#[derive(Debug, Clone)]
pub enum StaffEvent {
    SessionCompleted {
        candidate: String,
        exam: String,
        percentage: i64,
        passed: bool,
    },
    RequestSubmitted {
        title: String,
        category: RequestCategory,
        requester: String,
    },
    RequestDecided {
        title: String,
        approved: bool,
        reviewer: String,
    },
    RoleChanged {
        username: String,
        from: Role,
        to: Role,
    },
}

impl StaffEvent {
    fn render(&self) -> String {
        match self {
            StaffEvent::SessionCompleted {
                candidate,
                exam,
                percentage,
                passed,
            } => format!(
                "Exam '{exam}': {candidate} scored {percentage}% ({})",
                if *passed { "passed" } else { "failed" }
            ),
            StaffEvent::RequestSubmitted {
                title,
                category,
                requester,
            } => format!(
                "New {} request '{title}' from {requester}",
                category.as_str()
            ),
            StaffEvent::RequestDecided {
                title,
                approved,
                reviewer,
            } => format!(
                "Request '{title}' {} by {reviewer}",
                if *approved { "approved" } else { "rejected" }
            ),
            StaffEvent::RoleChanged { username, from, to } => {
                format!("{username} is now {to} (was {from})")
            }
        }
    }
}

/// Outbound staff notifications. Delivery is fire-and-forget: a broken
/// webhook must never fail the request that triggered the event.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: StaffEvent);
}

/// Posts events to a Discord-compatible webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: StaffEvent) {
        let client = self.client.clone();
        let url = self.webhook_url.clone();
        let body = json!({ "content": event.render() });
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!("Webhook returned {}", response.status());
                }
                Err(err) => {
                    tracing::warn!("Webhook delivery failed: {}", err);
                }
                _ => {}
            }
        });
    }
}

/// Used by tests and deployments without a configured webhook.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _event: StaffEvent) {}
}

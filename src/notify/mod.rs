// src/notify/mod.rs

//! Push notification delivery.
//!
//! One message per processed bulletin is sent to the source's topic. The
//! rendered template travels as a single JSON-encoded string under the
//! `json` data key, which is what the mobile client decodes.

pub mod alert;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AppError, Result};
use crate::models::NotificationConfig;

pub use alert::{Alerter, MailgunAlerter, NoopAlerter};

const FCM_ENDPOINT: &str = "https://fcm.googleapis.com/v1/projects";

/// A rendered notification addressed to a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub topic: String,
    pub payload: Value,
}

impl PushMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Data map of the message: the payload as one JSON string.
    pub fn data(&self) -> Result<Value> {
        Ok(json!({ "json": serde_json::to_string(&self.payload)? }))
    }
}

/// Trait for push notification backends.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<()>;
}

/// Firebase Cloud Messaging HTTP v1 sender.
pub struct FcmNotifier {
    client: reqwest::Client,
    url: String,
    token: String,
    dry_run: bool,
}

impl FcmNotifier {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        token: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            token: token.into(),
            dry_run,
        }
    }

    pub fn for_project(client: reqwest::Client, project_id: &str, token: &str, dry_run: bool) -> Self {
        let url = format!("{FCM_ENDPOINT}/{project_id}/messages:send");
        Self::new(client, url, token, dry_run)
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        let body = json!({
            "message": {
                "topic": message.topic,
                "data": message.data()?,
            },
            "validate_only": self.dry_run,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Notify(format!("FCM answered {status}: {detail}")));
        }

        log::info!(
            "<{}> notification sent{}",
            message.topic,
            if self.dry_run { " (dry run)" } else { "" }
        );
        Ok(())
    }
}

/// Logs messages instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        log::info!("<{}> notification (not delivered): {}", message.topic, message.data()?);
        Ok(())
    }
}

/// FCM when a project and token are configured, logging otherwise.
pub fn from_config(client: reqwest::Client, config: &NotificationConfig) -> Arc<dyn Notifier> {
    let token = std::env::var(&config.fcm_token_env)
        .ok()
        .filter(|token| !token.trim().is_empty());

    match (&config.fcm_project_id, token) {
        (Some(project), Some(token)) => Arc::new(FcmNotifier::for_project(
            client,
            project,
            &token,
            config.dry_run,
        )),
        (Some(_), None) => {
            log::warn!(
                "{} is not set; notifications will only be logged",
                config.fcm_token_env
            );
            Arc::new(LogNotifier)
        }
        (None, _) => Arc::new(LogNotifier),
    }
}

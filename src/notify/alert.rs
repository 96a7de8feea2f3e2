// src/notify/alert.rs

//! Operator alerts for conditions that stop a poller.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::AlertConfig;

const MAILGUN_API: &str = "https://api.mailgun.net/v3";

#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert(&self, subject: &str, body: &str) -> Result<()>;
}

/// Mailgun messages API sender.
pub struct MailgunAlerter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    sender: String,
    recipient: String,
}

impl MailgunAlerter {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: impl Into<String>, config: &AlertConfig) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
        }
    }

    /// Build from configuration; the API key comes from the environment.
    pub fn from_config(client: reqwest::Client, config: &AlertConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AppError::config(format!("{} is not set", config.api_key_env)))?;
        let url = format!("{MAILGUN_API}/{}/messages", config.domain);
        Ok(Self::new(client, url, api_key, config))
    }
}

#[async_trait]
impl Alerter for MailgunAlerter {
    async fn alert(&self, subject: &str, body: &str) -> Result<()> {
        let form = [
            ("from", self.sender.as_str()),
            ("to", self.recipient.as_str()),
            ("subject", subject),
            ("text", body),
        ];
        let response = self
            .client
            .post(&self.url)
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Notify(format!("Mailgun answered {status}")));
        }
        Ok(())
    }
}

/// Used when no alert configuration exists.
#[derive(Debug, Default)]
pub struct NoopAlerter;

#[async_trait]
impl Alerter for NoopAlerter {
    async fn alert(&self, subject: &str, _body: &str) -> Result<()> {
        log::debug!("Alerting disabled; dropping '{subject}'");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> AlertConfig {
        AlertConfig {
            domain: "mg.example.com".into(),
            sender: "crawler@example.com".into(),
            recipient: "ops@example.com".into(),
            api_key_env: "MAILGUN_API_KEY".into(),
        }
    }

    #[tokio::test]
    async fn test_mailgun_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mg.example.com/messages"))
            .and(header_exists("authorization"))
            .and(body_string_contains("subject=KMA+poller+stopped"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let alerter = MailgunAlerter::new(
            reqwest::Client::new(),
            format!("{}/v3/mg.example.com/messages", server.uri()),
            "key-1",
            &config(),
        );
        alerter.alert("KMA poller stopped", "HTTP 404").await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_alerter() {
        assert!(NoopAlerter.alert("subject", "body").await.is_ok());
    }
}

use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::core::config::NotifyConfig;
use crate::notify::compose::OutboundEmail;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Mail request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Mail endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Database error: {0}")]
    Database(String),
}

impl From<diesel::result::Error> for NotifyError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for NotifyError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Database(e.to_string())
    }
}

#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Posts messages as JSON to an external mail-sending endpoint.
#[derive(Debug, Clone)]
pub struct HttpMailSender {
    client: reqwest::Client,
    endpoint: String,
    secret: Option<String>,
    secret_header: String,
}

impl HttpMailSender {
    pub fn new(
        endpoint: impl Into<String>,
        secret: Option<String>,
        secret_header: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            secret,
            secret_header: secret_header.into(),
        })
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(email);
        if let Some(secret) = &self.secret {
            request = request.header(self.secret_header.as_str(), secret.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            "Sent \"{}\" to {} recipient(s)",
            email.subject,
            email.to.len()
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMailSender;

#[async_trait]
impl MailSender for NoopMailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        debug!("Notifications disabled; dropping \"{}\"", email.subject);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

pub fn mailer_from_config(config: &NotifyConfig) -> Arc<dyn MailSender> {
    if !config.enabled {
        return Arc::new(NoopMailSender);
    }
    let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) else {
        warn!("Notifications enabled but notify.endpoint is not set; mail is disabled");
        return Arc::new(NoopMailSender);
    };

    match HttpMailSender::new(
        endpoint,
        config.secret.clone(),
        config.secret_header.clone(),
        Duration::from_secs(config.timeout_seconds),
    ) {
        Ok(sender) => {
            info!("Outbound mail via {endpoint}");
            Arc::new(sender)
        }
        Err(e) => {
            warn!("Failed to build mail client, notifications disabled: {e}");
            Arc::new(NoopMailSender)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn email() -> OutboundEmail {
        OutboundEmail {
            to: vec!["a@example.com".into()],
            subject: "New comment: [Ticket #1234abcd] Printer".into(),
            text: "hello".into(),
            html: "<p>hello</p>".into(),
        }
    }

    #[tokio::test]
    async fn test_http_sender_posts_json_with_secret() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/send")
            .match_header("x-mail-secret", "hunter2")
            .match_body(Matcher::PartialJson(json!({
                "to": ["a@example.com"],
                "subject": "New comment: [Ticket #1234abcd] Printer",
                "text": "hello",
                "html": "<p>hello</p>"
            })))
            .with_status(200)
            .create_async()
            .await;

        let sender = HttpMailSender::new(
            format!("{}/send", server.url()),
            Some("hunter2".into()),
            "X-Mail-Secret",
            Duration::from_secs(5),
        )
        .unwrap();

        sender.send(&email()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_sender_reports_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/send")
            .with_status(401)
            .with_body("bad secret")
            .create_async()
            .await;

        let sender = HttpMailSender::new(
            format!("{}/send", server.url()),
            None,
            "X-Mail-Secret",
            Duration::from_secs(5),
        )
        .unwrap();

        match sender.send(&email()).await {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad secret");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_mailer_from_config() {
        let disabled = NotifyConfig::default();
        assert!(!mailer_from_config(&disabled).is_enabled());

        let missing_endpoint = NotifyConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(!mailer_from_config(&missing_endpoint).is_enabled());

        let enabled = NotifyConfig {
            enabled: true,
            endpoint: Some("http://127.0.0.1:9/send".into()),
            ..Default::default()
        };
        assert!(mailer_from_config(&enabled).is_enabled());
    }
}

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::{check_response, DeliveryError};
use crate::model::NotificationTask;

const SINK: &str = "slack";

/// Chat channel that receives one message per new posting.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn post(&self, task: &NotificationTask) -> Result<(), DeliveryError>;
}

#[derive(Clone)]
pub struct SlackWebhook {
    http: Client,
    webhook_url: Url,
}

impl fmt::Debug for SlackWebhook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the webhook path is the credential
        f.debug_struct("SlackWebhook")
            .field("host", &self.webhook_url.host_str())
            .finish_non_exhaustive()
    }
}

impl SlackWebhook {
    pub fn new(webhook_url: Url, timeout: Duration) -> Self {
        let http = Client::builder()
            .user_agent("job-relay/0.1")
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self { http, webhook_url }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let url = Url::parse(&cfg.slack.webhook_url)
            .map_err(|e| anyhow::anyhow!("invalid slack.webhook_url: {e}"))?;
        Ok(Self::new(url, cfg.http_timeout()))
    }

    pub fn build_request(&self, body: &Value) -> reqwest::Result<reqwest::Request> {
        self.http
            .post(self.webhook_url.clone())
            .header("Content-Type", "application/json")
            .json(body)
            .build()
    }
}

#[async_trait]
impl ChatService for SlackWebhook {
    async fn post(&self, task: &NotificationTask) -> Result<(), DeliveryError> {
        let body = build_job_message(task);
        let request = self
            .build_request(&body)
            .map_err(|source| DeliveryError::Transport { sink: SINK, source })?;
        debug!(id = %task.record.id, "posting slack notification");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| DeliveryError::Transport { sink: SINK, source })?;
        check_response(SINK, res).await?;
        Ok(())
    }
}

/// Block Kit message announcing a posting.
pub fn build_job_message(task: &NotificationTask) -> Value {
    let record = &task.record;
    let status = if record.client_verified {
        "✅ Verified"
    } else {
        "⚠️ Not Verified"
    };
    json!({
        "text": format!("New job opportunity: {}", record.title),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{} {} New Job Opportunity!", task.category.emoji(), task.priority.emoji()),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*{}*", record.title) }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Budget:*\n{}", record.budget_display()) },
                    { "type": "mrkdwn", "text": format!("*Client Status:*\n{}", status) },
                    { "type": "mrkdwn", "text": format!("*Client Spent:*\n${}", record.client_spent) },
                    { "type": "mrkdwn", "text": format!("*Category:*\n{}", task.category.label()) }
                ]
            },
            {
                "type": "actions",
                "elements": [
                    {
                        "type": "button",
                        "text": { "type": "plain_text", "text": "Apply Now", "emoji": true },
                        "url": record.url
                    }
                ]
            }
        ]
    })
}

//! LINE channel: reply to webhook events via the Messaging API reply endpoint.

use crate::channels::reply::{ReplyError, ReplySender};
use crate::config::LineConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    text: &'a str,
}

/// Client for the LINE reply API.
#[derive(Clone)]
pub struct LineChannel {
    api_base: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl LineChannel {
    /// Build a client from config; `access_token` is the resolved channel access token.
    pub fn new(config: &LineConfig, access_token: Option<String>) -> Result<Self, ReplyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_base: config.reply_api_base.trim_end_matches('/').to_string(),
            access_token,
            client,
        })
    }

    /// POST /v2/bot/message/reply with a single text message.
    pub async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), ReplyError> {
        let token = self.access_token.as_ref().ok_or(ReplyError::MissingToken)?;
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage { typ: "text", text }],
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ReplyError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplySender for LineChannel {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ReplyError> {
        self.reply_text(reply_token, text).await
    }
}

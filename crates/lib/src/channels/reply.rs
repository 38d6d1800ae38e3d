//! Outbound reply seam: the dispatcher sends at most one reply per event through this trait.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("channel access token not configured")]
    MissingToken,
    #[error("reply request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("reply api error: {0}")]
    Api(String),
}

/// Sends a text reply addressed by the platform's one-time reply token.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn reply(&self, reply_token: &str, text: &str) -> Result<(), ReplyError>;
}

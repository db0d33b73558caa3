//! Reply delivery: the channel handle seam and the log-and-swallow send.

use async_trait::async_trait;

/// One reply for one recipient. Sent once; never retried or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub recipient_id: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),
    #[error("send request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("send rejected: {0}")]
    Api(String),
}

/// Handle to a channel that can deliver replies.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "zalo").
    fn id(&self) -> &str;
    /// Send a text reply to the recipient.
    async fn send_message(&self, reply: &ReplyMessage) -> Result<(), DispatchError>;
}

/// Send one reply. Failures are logged and swallowed; returns whether the send succeeded.
pub async fn dispatch(channel: &dyn ChannelHandle, reply: &ReplyMessage) -> bool {
    match channel.send_message(reply).await {
        Ok(()) => {
            log::info!("{}: reply sent to {}", channel.id(), reply.recipient_id);
            true
        }
        Err(e) => {
            log::warn!(
                "{}: reply to {} not delivered: {}",
                channel.id(),
                reply.recipient_id,
                e
            );
            false
        }
    }
}

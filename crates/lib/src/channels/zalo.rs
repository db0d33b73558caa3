//! Zalo Official Account channel: webhook event payloads and the customer-service send API.

use crate::channels::dispatch::{ChannelHandle, DispatchError, ReplyMessage};
use crate::channels::inbound::{EventKind, InboundEvent};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

const ZALO_API_BASE: &str = "https://openapi.zalo.me";
const SEND_PATH: &str = "/v3.0/oa/message/cs";

/// Webhook POST body, reduced to the fields intake reads.
/// Fields that are absent or of an unexpected type are `None`; classification decides what that means.
#[derive(Debug, Default)]
pub struct ZaloEvent {
    pub event_name: Option<String>,
    /// Milliseconds since epoch; Zalo sends it as a string.
    pub timestamp: Option<serde_json::Value>,
    pub sender_id: Option<String>,
    pub msg_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntakeError {
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Parse the raw webhook body. Only a body that is not JSON is malformed here;
/// any JSON value parses, and shapes that are not Zalo events classify as ignored.
pub fn parse_event(body: &[u8]) -> Result<ZaloEvent, IntakeError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| IntakeError::Malformed(e.to_string()))?;
    let str_at = |pointer: &str| {
        value
            .pointer(pointer)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    Ok(ZaloEvent {
        event_name: str_at("/event_name"),
        timestamp: value.get("timestamp").cloned(),
        sender_id: str_at("/sender/id"),
        msg_id: str_at("/message/msg_id"),
        text: str_at("/message/text"),
    })
}

impl ZaloEvent {
    /// Timestamp as the string that was signed (empty when absent).
    pub fn timestamp_str(&self) -> String {
        match &self.timestamp {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Classify into an `InboundEvent`. Only a text event must carry sender id and message text;
    /// a missing event name classifies as an ignored kind.
    pub fn into_inbound(self) -> Result<InboundEvent, IntakeError> {
        let kind = EventKind::from_name(self.event_name.as_deref().unwrap_or_default());
        match kind {
            EventKind::UserSendText => {
                let sender_id = self
                    .sender_id
                    .ok_or_else(|| IntakeError::Malformed("missing sender.id".to_string()))?;
                if self.text.is_none() {
                    return Err(IntakeError::Malformed("missing message.text".to_string()));
                }
                Ok(InboundEvent {
                    event_kind: kind,
                    sender_id,
                    message_text: self.text,
                })
            }
            EventKind::Other(_) => Ok(InboundEvent {
                event_kind: kind,
                sender_id: self.sender_id.unwrap_or_default(),
                message_text: self.text,
            }),
        }
    }
}

/// Check the `X-ZEvent-Signature` header: `mac=` + hex(sha256(app_id + body + timestamp + secret)).
/// The `mac=` prefix is optional on the provided value. Digests are compared without early exit.
pub fn verify_signature(
    app_id: &str,
    secret: &str,
    body: &[u8],
    timestamp: &str,
    provided: &str,
) -> bool {
    let mut hasher = Sha256::new();
    hasher.update(app_id.as_bytes());
    hasher.update(body);
    hasher.update(timestamp.as_bytes());
    hasher.update(secret.as_bytes());
    let expected = hasher.finalize();
    let provided = provided.trim();
    let provided = provided.strip_prefix("mac=").unwrap_or(provided);
    match decode_hex(provided) {
        Some(bytes) if bytes.len() == expected.len() => {
            expected
                .iter()
                .zip(&bytes)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
        }
        _ => false,
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    error: i64,
    #[serde(default)]
    message: Option<String>,
}

/// Zalo OA connector: sends customer-service text messages.
pub struct ZaloChannel {
    id: String,
    api_base: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl ZaloChannel {
    pub fn new(api_base: Option<String>, access_token: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ZALO_API_BASE.to_string());
        Self {
            id: "zalo".to_string(),
            api_base,
            access_token,
            client: reqwest::Client::new(),
        }
    }

    /// POST /v3.0/oa/message/cs. A non-2xx status or a body with `error != 0` is a failure.
    pub async fn send_message(&self, reply: &ReplyMessage) -> Result<(), DispatchError> {
        let token = self
            .access_token
            .as_ref()
            .ok_or(DispatchError::NotConfigured("zalo access token not configured"))?;
        let url = format!("{}{}", self.api_base, SEND_PATH);
        let body = serde_json::json!({
            "recipient": { "user_id": reply.recipient_id },
            "message": { "text": reply.text },
        });
        let res = self
            .client
            .post(&url)
            .header("access_token", token)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        log::info!("zalo send response: {} {}", status, text);
        if !status.is_success() {
            return Err(DispatchError::Api(format!("{} {}", status, text)));
        }
        match serde_json::from_str::<SendResponse>(&text) {
            Ok(data) if data.error != 0 => Err(DispatchError::Api(format!(
                "error {}: {}",
                data.error,
                data.message.unwrap_or_default()
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ChannelHandle for ZaloChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_message(&self, reply: &ReplyMessage) -> Result<(), DispatchError> {
        ZaloChannel::send_message(self, reply).await
    }
}

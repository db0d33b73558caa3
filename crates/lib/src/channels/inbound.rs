//! Inbound event from a channel: the classified, immutable view of one webhook call.

/// Zalo event name for a plain text message sent by a user to the OA.
pub const USER_SEND_TEXT: &str = "user_send_text";

/// Kind of inbound event. Only `UserSendText` is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    UserSendText,
    /// Any other event (e.g. "user_seen", "follow"), carrying the raw event name.
    Other(String),
}

impl EventKind {
    pub fn from_name(name: &str) -> Self {
        if name == USER_SEND_TEXT {
            EventKind::UserSendText
        } else {
            EventKind::Other(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EventKind::UserSendText => USER_SEND_TEXT,
            EventKind::Other(name) => name,
        }
    }
}

/// A message event from a channel, to be answered by the auto-responder.
/// Built once per webhook call and dropped when the call completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub event_kind: EventKind,
    /// Channel-side user id the reply goes to. Empty for events without a sender.
    pub sender_id: String,
    pub message_text: Option<String>,
}

impl InboundEvent {
    /// Text to answer, when this is a user text message with non-blank content.
    pub fn answerable_text(&self) -> Option<&str> {
        match (&self.event_kind, self.message_text.as_deref()) {
            (EventKind::UserSendText, Some(text)) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

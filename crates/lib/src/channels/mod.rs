//! Communication channels (Zalo Official Account).
//!
//! Inbound: the webhook body is parsed into an `InboundEvent`.
//! Outbound: replies go through a `ChannelHandle`.

mod dispatch;
mod inbound;
mod zalo;

pub use dispatch::{dispatch, ChannelHandle, DispatchError, ReplyMessage};
pub use inbound::{EventKind, InboundEvent, USER_SEND_TEXT};
pub use zalo::{parse_event, verify_signature, IntakeError, ZaloChannel, ZaloEvent};

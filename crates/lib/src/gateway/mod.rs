//! Gateway: HTTP server for the Zalo webhook and a health probe.
//!
//! Every POST to the webhook is acknowledged with HTTP 200 whatever happens inside
//! the pipeline; only a non-POST method gets a different status (405).

pub mod ack;
mod server;

pub use ack::{Ack, ACK_ERROR_HANDLED, ACK_OK};
pub use server::{router, run_gateway, GatewayState, WebhookSigning, SIGNATURE_HEADER};

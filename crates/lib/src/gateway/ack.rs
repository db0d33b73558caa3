//! Webhook ack boundary: turns any pipeline result, or a panic, into HTTP 200.
//!
//! Zalo redelivers events that get a non-200 answer, which would produce duplicate
//! replies; failures are therefore visible only in the log.

use crate::pipeline::{PipelineError, PipelineOutcome};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::future::Future;

pub const ACK_OK: &str = "OK";
pub const ACK_ERROR_HANDLED: &str = "Error Handled";

/// Body of the 200 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    ErrorHandled,
}

impl Ack {
    pub fn body(self) -> &'static str {
        match self {
            Ack::Ok => ACK_OK,
            Ack::ErrorHandled => ACK_ERROR_HANDLED,
        }
    }

    /// Completed, ignored, or dispatch-only failures are `Ok`; any caught error is `ErrorHandled`.
    pub fn for_result(
        invocation: &str,
        result: &Result<PipelineOutcome, PipelineError>,
    ) -> Self {
        match result {
            Ok(PipelineOutcome::Ignored) => {
                log::debug!("[{}] no reply needed", invocation);
                Ack::Ok
            }
            Ok(PipelineOutcome::Replied { delivered, .. }) => {
                if !delivered {
                    log::warn!("[{}] reply composed but not delivered", invocation);
                }
                Ack::Ok
            }
            Err(e) => {
                log::warn!("[{}] webhook handled with error: {}", invocation, e);
                Ack::ErrorHandled
            }
        }
    }
}

impl IntoResponse for Ack {
    fn into_response(self) -> Response {
        (StatusCode::OK, self.body()).into_response()
    }
}

/// Run the pipeline work in its own task so a panic cannot escape the ack.
pub async fn contain<F>(invocation: &str, work: F) -> Ack
where
    F: Future<Output = Result<PipelineOutcome, PipelineError>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => Ack::for_result(invocation, &result),
        Err(e) => {
            log::error!("[{}] webhook task aborted: {}", invocation, e);
            Ack::ErrorHandled
        }
    }
}

//! Inbound action frame handling shared by every transport.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use onebot_core::action::codec;
use onebot_core::{ActionMux, RawRequest, RawResponse, Response, RetCode};
use tracing::{debug, error};

/// Dispatches `request` and turns a handler panic into a 13001 response.
pub async fn dispatch_guarded(router: &ActionMux, request: RawRequest) -> RawResponse {
    let action = request.action.clone();
    let echo = request.echo.clone();

    match AssertUnwindSafe(router.dispatch(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(action = %action, reason = %reason, "Action handler panicked");
            Response::failed(RetCode::BAD_HANDLER, format!("action handler panicked: {reason}"))
                .with_echo(echo)
        }
    }
}

/// Decodes a raw frame, dispatches it under the panic guard and encodes the
/// response in the same wire mode.
pub async fn handle_frame(router: &ActionMux, raw: &[u8], binary: bool) -> Vec<u8> {
    let response = match codec::parse_request(raw, binary) {
        Ok(request) => {
            debug!(action = %request.action, binary, "Dispatching action");
            dispatch_guarded(router, request).await
        }
        Err(rejected) => {
            debug!(reason = %rejected.message, binary, "Rejected action frame");
            rejected
        }
    };
    codec::encode_response(&response, binary)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

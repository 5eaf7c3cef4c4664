//! Action request/response envelopes and the return-code space.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ActionError;

// ============================================================================
// Return codes
// ============================================================================

/// An action return code.
///
/// This is an open integer space rather than an enum so that platforms can
/// define their own codes. Codes are grouped into bands by their leading
/// digits (see [`RetCodeBand`]); new codes belong in the band of the layer
/// that raises them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetCode(i64);

impl RetCode {
    /// Success.
    pub const OK: Self = Self(0);

    /// Malformed request: bad format, missing or mistyped required fields.
    pub const BAD_REQUEST: Self = Self(11001);
    /// The implementation does not provide the requested action.
    pub const UNSUPPORTED_ACTION: Self = Self(11002);
    /// Missing or mistyped action parameters.
    pub const BAD_PARAM: Self = Self(11003);

    /// Storage/database failure.
    pub const DATABASE_ERROR: Self = Self(12100);
    /// Filesystem failure.
    pub const FILESYSTEM_ERROR: Self = Self(12200);
    /// Upstream chat platform failure.
    pub const PLATFORM_ERROR: Self = Self(12300);
    /// Action logic failure, e.g. messaging a user that does not exist.
    pub const LOGIC_ERROR: Self = Self(12400);

    /// Faulty action handler implementation.
    pub const BAD_HANDLER: Self = Self(13001);

    /// Wraps an arbitrary code, typically a platform-specific one.
    pub const fn new(code: i64) -> Self {
        Self(code)
    }

    /// Returns the raw integer value.
    pub const fn code(self) -> i64 {
        self.0
    }

    /// Returns `true` for the success code.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Returns the band this code belongs to, if any.
    pub fn band(self) -> Option<RetCodeBand> {
        match self.0 {
            11000..=11999 => Some(RetCodeBand::Request),
            12000..=12999 => Some(RetCodeBand::Execution),
            13000..=13999 => Some(RetCodeBand::Framework),
            _ => None,
        }
    }
}

impl Default for RetCode {
    fn default() -> Self {
        Self::OK
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RetCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

/// Reserved return-code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCodeBand {
    /// `11xxx`: the request itself is unusable.
    Request,
    /// `12xxx`: the handler ran and failed.
    Execution,
    /// `13xxx`: the framework or handler implementation is broken.
    Framework,
}

// ============================================================================
// Status
// ============================================================================

/// Execution status of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The action succeeded.
    #[default]
    Ok,
    /// The action failed; see `retcode` and `message`.
    Failed,
}

// ============================================================================
// Request
// ============================================================================

/// An action request envelope.
///
/// `echo` is opaque to the implementation and is returned verbatim in the
/// matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<P> {
    /// Action name.
    #[serde(default)]
    pub action: String,
    /// Action parameters.
    #[serde(default)]
    pub params: P,
    /// Caller correlation token.
    #[serde(default)]
    pub echo: Value,
}

impl<P> Request<P> {
    /// Creates a request without an echo token.
    pub fn new(action: impl Into<String>, params: P) -> Self {
        Self {
            action: action.into(),
            params,
            echo: Value::Null,
        }
    }

    /// Sets the echo token.
    pub fn with_echo(mut self, echo: impl Into<Value>) -> Self {
        self.echo = echo.into();
        self
    }
}

/// A request whose parameters have not been bound to a concrete type yet.
pub type RawRequest = Request<Value>;

// ============================================================================
// Response
// ============================================================================

/// An action response envelope.
///
/// The constructors keep `status`, `retcode` and `message` consistent:
/// `status == ok` exactly when `retcode == 0`, which is exactly when
/// `message` is empty. `data` is only ever populated on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "WireResponse<D>",
    bound(deserialize = "D: Deserialize<'de>")
)]
pub struct Response<D> {
    /// Execution status.
    pub status: Status,
    /// Return code.
    pub retcode: RetCode,
    /// Response data (success only).
    #[serde(default)]
    pub data: Option<D>,
    /// Error message (failure only).
    #[serde(default)]
    pub message: String,
    /// Echo copied from the request.
    #[serde(default)]
    pub echo: Value,
}

impl<D> Response<D> {
    /// A successful response carrying `data`.
    pub fn ok(data: D) -> Self {
        Self {
            status: Status::Ok,
            retcode: RetCode::OK,
            data: Some(data),
            message: String::new(),
            echo: Value::Null,
        }
    }

    /// A failed response.
    ///
    /// An empty message is replaced with a generic one so the invariant
    /// `status == failed ⇔ message != ""` holds.
    pub fn failed(retcode: RetCode, message: impl Into<String>) -> Self {
        let error = ActionError::new(retcode, message);
        let message = if error.message.is_empty() {
            format!("action failed with retcode {}", error.retcode)
        } else {
            error.message
        };
        Self {
            status: Status::Failed,
            retcode: error.retcode,
            data: None,
            message,
            echo: Value::Null,
        }
    }

    /// Sets the echo token.
    pub fn with_echo(mut self, echo: Value) -> Self {
        self.echo = echo;
        self
    }

    /// Returns `true` if the action succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Converts the response into a `Result`.
    pub fn into_result(self) -> Result<Option<D>, ActionError> {
        match self.status {
            Status::Ok => Ok(self.data),
            Status::Failed => Err(ActionError::new(self.retcode, self.message)),
        }
    }
}

impl<D> From<ActionError> for Response<D> {
    fn from(error: ActionError) -> Self {
        Self::failed(error.retcode, error.message)
    }
}

/// A response whose data has been converted to a generic document.
pub type RawResponse = Response<Value>;

/// The decoded shape of a response before `data` is reconciled with `status`.
///
/// A present `null` stays `Some` so that `Response::ok(())` and
/// `Response::ok(Value::Null)` decode back unchanged; `data` of a failed
/// response is always dropped.
#[derive(Deserialize)]
#[serde(bound(deserialize = "D: Deserialize<'de>"))]
struct WireResponse<D> {
    status: Status,
    retcode: RetCode,
    #[serde(default, deserialize_with = "present")]
    data: Option<D>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    echo: Value,
}

impl<D> From<WireResponse<D>> for Response<D> {
    fn from(wire: WireResponse<D>) -> Self {
        Self {
            data: match wire.status {
                Status::Ok => wire.data,
                Status::Failed => None,
            },
            status: wire.status,
            retcode: wire.retcode,
            message: wire.message,
            echo: wire.echo,
        }
    }
}

fn present<'de, De, T>(deserializer: De) -> Result<Option<T>, De::Error>
where
    De: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retcode_bands() {
        assert_eq!(RetCode::BAD_REQUEST.band(), Some(RetCodeBand::Request));
        assert_eq!(RetCode::UNSUPPORTED_ACTION.band(), Some(RetCodeBand::Request));
        assert_eq!(RetCode::LOGIC_ERROR.band(), Some(RetCodeBand::Execution));
        assert_eq!(RetCode::BAD_HANDLER.band(), Some(RetCodeBand::Framework));
        assert_eq!(RetCode::OK.band(), None);
        assert_eq!(RetCode::new(12345).band(), Some(RetCodeBand::Execution));
        assert_eq!(RetCode::new(99999).band(), None);
    }

    #[test]
    fn test_response_invariants() {
        let ok = Response::ok(1);
        assert!(ok.is_ok());
        assert_eq!(ok.retcode, RetCode::OK);
        assert!(ok.message.is_empty());

        let failed: Response<i32> = Response::failed(RetCode::LOGIC_ERROR, "no such user");
        assert_eq!(failed.status, Status::Failed);
        assert_eq!(failed.retcode, RetCode::LOGIC_ERROR);
        assert!(failed.data.is_none());

        // A failure can never carry the success code or an empty message.
        let forced: Response<i32> = Response::failed(RetCode::OK, "");
        assert_eq!(forced.retcode, RetCode::BAD_HANDLER);
        assert!(!forced.message.is_empty());
    }

    #[test]
    fn test_response_wire_shape() {
        let response = Response::ok(json!({"user_id": "42"})).with_echo(json!("abc"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "ok",
                "retcode": 0,
                "data": {"user_id": "42"},
                "message": "",
                "echo": "abc",
            })
        );
    }

    #[test]
    fn test_null_data_is_kept_on_success() {
        let decoded: RawResponse =
            serde_json::from_str(r#"{"status": "ok", "retcode": 0, "data": null, "message": ""}"#)
                .unwrap();
        assert_eq!(decoded.data, Some(Value::Null));

        let missing: RawResponse =
            serde_json::from_str(r#"{"status": "ok", "retcode": 0, "message": ""}"#).unwrap();
        assert_eq!(missing.data, None);

        let failed: RawResponse = serde_json::from_str(
            r#"{"status": "failed", "retcode": 12400, "data": null, "message": "no"}"#,
        )
        .unwrap();
        assert_eq!(failed.data, None);

        let unit: Response<()> =
            serde_json::from_str(r#"{"status": "ok", "retcode": 0, "data": null, "message": ""}"#)
                .unwrap();
        assert_eq!(unit.data, Some(()));
    }

    #[test]
    fn test_request_defaults() {
        let request: RawRequest = serde_json::from_str(r#"{"action": "get_status"}"#).unwrap();
        assert_eq!(request.action, "get_status");
        assert_eq!(request.params, Value::Null);
        assert_eq!(request.echo, Value::Null);
    }
}

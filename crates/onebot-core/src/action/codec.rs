//! Wire codec for action envelopes.
//!
//! Text mode is JSON; binary mode is MessagePack with named fields so both
//! modes share the same field names. The mode travels with the frame, never
//! inside it.
//!
//! MessagePack `bin` values in inbound requests become base64 strings, which
//! is how bytes are carried in text mode.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use tracing::error;

use super::protocol::{RawRequest, RawResponse, Response, RetCode};
use crate::error::{ActionError, CodecResult};

/// Encodes `value` in text (JSON) or binary (MessagePack) mode.
pub fn encode<T: Serialize + ?Sized>(value: &T, binary: bool) -> CodecResult<Vec<u8>> {
    if binary {
        Ok(rmp_serde::to_vec_named(value)?)
    } else {
        Ok(serde_json::to_vec(value)?)
    }
}

/// Decodes a value from `bytes` in the given mode.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], binary: bool) -> CodecResult<T> {
    if binary {
        Ok(rmp_serde::from_slice(bytes)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A generic document decoded from MessagePack, with `bin` mapped to base64.
#[derive(Default)]
struct BinaryValue(Value);

impl<'de> Deserialize<'de> for BinaryValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BinaryValueVisitor)
    }
}

struct BinaryValueVisitor;

impl<'de> Visitor<'de> for BinaryValueVisitor {
    type Value = BinaryValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MessagePack value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Number::from_f64(v).map_or(Value::Null, Value::Number)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::String(v.to_owned())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::String(v)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::String(BASE64.encode(v))))
    }

    fn visit_unit<E: de::Error>(self) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::Null))
    }

    fn visit_none<E: de::Error>(self) -> Result<BinaryValue, E> {
        Ok(BinaryValue(Value::Null))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<BinaryValue, D::Error> {
        BinaryValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BinaryValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(BinaryValue(item)) = seq.next_element()? {
            items.push(item);
        }
        Ok(BinaryValue(Value::Array(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<BinaryValue, A::Error> {
        let mut object = Map::new();
        while let Some((key, BinaryValue(value))) = map.next_entry::<String, BinaryValue>()? {
            object.insert(key, value);
        }
        Ok(BinaryValue(Value::Object(object)))
    }
}

/// The binary-mode shape of a request.
#[derive(Deserialize)]
struct BinaryRequest {
    #[serde(default)]
    action: String,
    #[serde(default)]
    params: BinaryValue,
    #[serde(default)]
    echo: BinaryValue,
}

fn decode_request(bytes: &[u8], binary: bool) -> CodecResult<RawRequest> {
    if !binary {
        return decode(bytes, false);
    }
    let request: BinaryRequest = decode(bytes, true)?;
    Ok(RawRequest {
        action: request.action,
        params: request.params.0,
        echo: request.echo.0,
    })
}

/// Decodes an inbound action frame.
///
/// Returns a ready-to-send `failed` response (retcode 11001) when the frame
/// is empty, cannot be decoded or names no action. The echo is kept whenever
/// the frame got far enough to carry one.
pub fn parse_request(bytes: &[u8], binary: bool) -> Result<RawRequest, RawResponse> {
    if bytes.is_empty() {
        return Err(ActionError::bad_request("empty request").into());
    }

    let request = decode_request(bytes, binary)
        .map_err(|e| RawResponse::from(ActionError::bad_request(format!("invalid request: {e}"))))?;

    if request.action.trim().is_empty() {
        return Err(RawResponse::from(ActionError::bad_request("missing action")).with_echo(request.echo));
    }

    Ok(request)
}

/// Encodes an outbound response, falling back to a bare 13001 failure if the
/// response itself cannot be encoded.
pub fn encode_response(response: &RawResponse, binary: bool) -> Vec<u8> {
    match encode(response, binary) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to encode action response");
            let fallback: RawResponse =
                Response::failed(RetCode::BAD_HANDLER, "failed to encode response")
                    .with_echo(response.echo.clone());
            encode(&fallback, binary).unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_response_survives_both_modes() {
        let responses: Vec<RawResponse> = vec![
            Response::ok(json!({"message_id": "6283", "time": 1632847927})).with_echo(json!(7)),
            Response::failed(RetCode::LOGIC_ERROR, "user not found").with_echo(json!("e")),
            Response::ok(Value::Null).with_echo(json!(1)),
        ];

        for binary in [false, true] {
            for response in &responses {
                let bytes = encode(response, binary).unwrap();
                let back: RawResponse = decode(&bytes, binary).unwrap();
                assert_eq!(&back, response, "binary = {binary}");
            }
        }
    }

    #[test]
    fn test_binary_uses_named_fields() {
        let request = RawRequest::new("get_status", json!({})).with_echo("x");
        let bytes = encode(&request, true).unwrap();
        // Named encoding produces a map, so the value decodes into a generic document.
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value["action"], "get_status");
        assert_eq!(value["echo"], "x");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(decode::<RawRequest>(b"{not json", false).is_err());
        assert!(decode::<RawRequest>(&[0xc1], true).is_err());
    }

    #[test]
    fn test_parse_request_rejections() {
        let empty = parse_request(b"", false).unwrap_err();
        assert_eq!(empty.retcode, RetCode::BAD_REQUEST);

        let garbage = parse_request(b"hello", false).unwrap_err();
        assert_eq!(garbage.retcode, RetCode::BAD_REQUEST);

        let no_action = parse_request(br#"{"params": {}, "echo": 5}"#, false).unwrap_err();
        assert_eq!(no_action.retcode, RetCode::BAD_REQUEST);
        assert_eq!(no_action.echo, json!(5));

        let blank_action = parse_request(br#"{"action": "  "}"#, false).unwrap_err();
        assert_eq!(blank_action.retcode, RetCode::BAD_REQUEST);
    }

    /// `{"action": "upload_file", "params": {"data": <bin "abc">}, "echo": 4}`
    const BIN_REQUEST: &[u8] = &[
        0x83, // map of 3
        0xa6, b'a', b'c', b't', b'i', b'o', b'n',
        0xab, b'u', b'p', b'l', b'o', b'a', b'd', b'_', b'f', b'i', b'l', b'e',
        0xa6, b'p', b'a', b'r', b'a', b'm', b's',
        0x81, // map of 1
        0xa4, b'd', b'a', b't', b'a',
        0xc4, 0x03, b'a', b'b', b'c', // bin 8
        0xa4, b'e', b'c', b'h', b'o',
        0x04,
    ];

    #[test]
    fn test_parse_request_binary_bytes() {
        let request = parse_request(BIN_REQUEST, true).unwrap();
        assert_eq!(request.action, "upload_file");
        assert_eq!(request.params, json!({"data": "YWJj"}));
        assert_eq!(request.echo, json!(4));
    }

    #[test]
    fn test_parse_request_binary() {
        let bytes = encode(&RawRequest::new("get_version", json!({})), true).unwrap();
        let request = parse_request(&bytes, true).unwrap();
        assert_eq!(request.action, "get_version");
    }
}

//! Wire envelopes exchanged with clients.
//!
//! Client frames are JSON objects with a `type` of `send`, `publish`,
//! `register`, `unregister` or `ping`. The bridge answers with:
//!
//! ```text
//! {"type":"rec","address":..,"body":..,"headers"?:..,"replyAddress"?:..}   delivered message
//! {"address":..,"failureCode":..,"failureType":..,"message":..}            reply failure
//! {"type":"err","body":"<code>"}                                           protocol error
//! ```

use crate::domain::error::ErrorCode;
use serde_json::{json, Map, Value};
use shared_bus::{BusMessage, Headers, ReplyFailure};

/// Decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Ping,
    Send {
        address: String,
        body: Value,
        headers: Headers,
        reply_address: Option<String>,
    },
    Publish {
        address: String,
        body: Value,
        headers: Headers,
    },
    Register {
        address: String,
    },
    Unregister {
        address: String,
    },
}

impl ClientFrame {
    /// Value of the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Send { .. } => "send",
            Self::Publish { .. } => "publish",
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
        }
    }

    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Ping => None,
            Self::Send { address, .. }
            | Self::Publish { address, .. }
            | Self::Register { address }
            | Self::Unregister { address } => Some(address),
        }
    }
}

/// A decoded frame together with the document it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    pub frame: ClientFrame,
    pub raw: Value,
}

/// Decode one client frame.
///
/// Checks run in order: JSON object, `type` present, `address` present
/// (except for `ping`), known `type`.
pub fn decode(bytes: &[u8]) -> Result<InboundEnvelope, ErrorCode> {
    let raw: Value = serde_json::from_slice(bytes).map_err(|_| ErrorCode::InvalidJson)?;
    let doc = raw.as_object().ok_or(ErrorCode::InvalidJson)?;

    let kind = match doc.get("type") {
        None | Some(Value::Null) => return Err(ErrorCode::MissingType),
        Some(Value::String(kind)) => kind.as_str(),
        Some(_) => return Err(ErrorCode::InvalidType),
    };

    if kind == "ping" {
        return Ok(InboundEnvelope {
            frame: ClientFrame::Ping,
            raw,
        });
    }

    let address = match doc.get("address") {
        Some(Value::String(address)) => address.clone(),
        _ => return Err(ErrorCode::MissingAddress),
    };

    let frame = match kind {
        "send" => ClientFrame::Send {
            body: body_of(doc),
            headers: headers_of(doc),
            reply_address: reply_address_of(doc)?,
            address,
        },
        "publish" => ClientFrame::Publish {
            body: body_of(doc),
            headers: headers_of(doc),
            address,
        },
        "register" => ClientFrame::Register { address },
        "unregister" => ClientFrame::Unregister { address },
        _ => return Err(ErrorCode::InvalidType),
    };

    Ok(InboundEnvelope { frame, raw })
}

fn body_of(doc: &Map<String, Value>) -> Value {
    doc.get("body").cloned().unwrap_or(Value::Null)
}

fn reply_address_of(doc: &Map<String, Value>) -> Result<Option<String>, ErrorCode> {
    match doc.get("replyAddress") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(reply)) => Ok(Some(reply.clone())),
        Some(_) => Err(ErrorCode::InvalidReplyAddress),
    }
}

/// Headers object; non-string values are carried as their JSON text.
fn headers_of(doc: &Map<String, Value>) -> Headers {
    let Some(Value::Object(headers)) = doc.get("headers") else {
        return Headers::new();
    };
    headers
        .iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// `rec` document for a bus message delivered under `address`.
pub fn delivery(address: &str, message: &BusMessage) -> Value {
    let mut doc = json!({
        "type": "rec",
        "address": address,
        "body": message.body,
    });
    if !message.headers.is_empty() {
        doc["headers"] = json!(message.headers);
    }
    if let Some(reply_address) = &message.reply_address {
        doc["replyAddress"] = json!(reply_address);
    }
    doc
}

/// Reply failure frame; deliberately carries no `type`.
pub fn reply_failure(reply_address: &str, failure: &ReplyFailure) -> String {
    json!({
        "address": reply_address,
        "failureCode": failure.failure_code,
        "failureType": failure.failure_type.as_str(),
        "message": failure.message,
    })
    .to_string()
}

/// Protocol error frame.
pub fn error(code: ErrorCode) -> String {
    json!({
        "type": "err",
        "body": code.as_str(),
    })
    .to_string()
}

//! Normalized response handed back to callers.

use crate::http::headers::HeaderSet;
use crate::transport::TransportResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Empty,
    Json(Value),
    Text(String),
    /// Neither JSON nor UTF-8.
    Raw(Bytes),
}

impl ResponseData {
    /// Decode a body: JSON first, then UTF-8 text, otherwise raw bytes.
    pub fn parse(body: Bytes) -> Self {
        if body.is_empty() {
            return ResponseData::Empty;
        }
        if let Ok(value) = serde_json::from_slice::<Value>(&body) {
            return ResponseData::Json(value);
        }
        match String::from_utf8(body.to_vec()) {
            Ok(text) => ResponseData::Text(text),
            Err(_) => ResponseData::Raw(body),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for ResponseData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseData::Empty => serializer.serialize_none(),
            ResponseData::Json(value) => value.serialize(serializer),
            ResponseData::Text(text) => serializer.serialize_str(text),
            ResponseData::Raw(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        }
    }
}

/// Response after the retry loop and incoming hook have run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub code: u16,
    pub headers: HeaderSet,
    pub data: ResponseData,
    /// URL of the final hop, after redirects.
    pub last_requested_url: String,
    pub ok: bool,
}

impl ClientResponse {
    pub fn from_transport(response: TransportResponse) -> Self {
        let code = response.status.as_u16();
        Self {
            code,
            headers: HeaderSet::from_header_map(&response.headers),
            data: ResponseData::parse(response.body),
            last_requested_url: response.url.to_string(),
            ok: (200..300).contains(&code),
        }
    }

    /// Serialize for bridge callers.
    pub fn to_json(&self) -> Value {
        // Serialization of these types cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

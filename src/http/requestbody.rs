//! Request body for PUT/POST/PATCH operations.

use crate::base::neterror::NetError;
use bytes::Bytes;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Request body as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body (GET, DELETE).
    #[default]
    Empty,
    /// Structured JSON, serialized at dispatch.
    Json(Value),
    /// Raw string sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Bytes),
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<Value> for RequestBody {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => RequestBody::Empty,
            Value::String(s) => RequestBody::Text(s),
            other => RequestBody::Json(other),
        }
    }
}

impl<'de> Deserialize<'de> for RequestBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(RequestBody::from)
    }
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Content type implied by the body, if any.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RequestBody::Json(_) => Some("application/json"),
            _ => None,
        }
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Bytes, NetError> {
        match self {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Json(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
            RequestBody::Text(s) => Ok(Bytes::from(s.clone())),
            RequestBody::Bytes(b) => Ok(b.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_empty() {
        let body = RequestBody::default();
        assert!(body.is_empty());
        assert!(body.to_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_from_json_value() {
        assert_eq!(RequestBody::from(Value::Null), RequestBody::Empty);
        assert_eq!(
            RequestBody::from(json!("raw")),
            RequestBody::Text("raw".into())
        );
        assert!(matches!(
            RequestBody::from(json!({"a": 1})),
            RequestBody::Json(_)
        ));
    }

    #[test]
    fn test_json_body_encoding() {
        let body = RequestBody::from(json!({"name": "x"}));
        assert_eq!(body.content_type(), Some("application/json"));
        assert_eq!(&body.to_bytes().unwrap()[..], br#"{"name":"x"}"#);
    }

    #[test]
    fn test_text_body_has_no_content_type() {
        let body: RequestBody = "hello".into();
        assert_eq!(body.content_type(), None);
        assert_eq!(&body.to_bytes().unwrap()[..], b"hello");
    }

    #[test]
    fn test_deserialize_from_options() {
        let body: RequestBody = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(body, RequestBody::Json(json!([1, 2])));
    }
}

//! Application-level response envelope.
//!
//! Every endpoint of the remote service answers `200 OK` with a JSON body of
//! the shape `{"code": <number>, "msg": <string>, "data": <payload>}`. The
//! numeric `code` is what the classifier reads; `data` is only meaningful
//! when the code is zero.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ExecuteError, TransportError};

/// Decoded reply from one round-trip to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub code: i64,
    /// Raw body, kept for diagnostics in retry logs.
    pub body: String,
    pub data: Option<T>,
}

#[derive(Deserialize)]
struct Wire {
    code: serde_json::Number,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl<T> Envelope<T> {
    /// Envelope with code 0 and the given payload.
    pub fn ok(data: T) -> Self {
        Self { code: 0, body: String::new(), data: Some(data) }
    }

    /// Envelope with a non-zero code and no payload.
    pub fn code(code: i64) -> Self {
        Self { code, body: format!("{{\"code\":{}}}", code), data: None }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Take the payload of a successful envelope.
    pub fn into_payload(self) -> Result<T, ExecuteError> {
        self.data.ok_or(ExecuteError::MissingPayload)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode an HTTP reply. Non-2xx statuses and bodies without a numeric
    /// `code` become transport errors. A payload that fails to decode is only
    /// an error when the code is zero.
    pub fn from_http(status: u16, body: &[u8]) -> Result<Self, TransportError> {
        let text = String::from_utf8_lossy(body).into_owned();
        if !(200..300).contains(&status) {
            return Err(TransportError::status(status, text));
        }

        let raw: Wire = serde_json::from_slice(body)
            .map_err(|e| TransportError::status(status, format!("invalid envelope: {}", e)))?;
        // float codes are truncated
        let code = raw
            .code
            .as_i64()
            .or_else(|| raw.code.as_f64().map(|f| f as i64))
            .ok_or_else(|| TransportError::status(status, format!("invalid code in {}", text)))?;

        let data = match raw.data {
            None => None,
            Some(value) => match serde_json::from_value::<T>(value) {
                Ok(data) => Some(data),
                Err(e) if code == 0 => {
                    return Err(TransportError::status(status, format!("invalid payload: {}", e)))
                }
                Err(_) => None,
            },
        };

        Ok(Self { code, body: text, data })
    }
}

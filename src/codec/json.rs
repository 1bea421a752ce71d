//! JSON codec using `serde_json`.
//!
//! The feed carries plain JSON text both ways: inbound values arrive
//! inflated from the shared deflate context, outbound payloads (e.g. the
//! keepalive reply) are sent as text frames.
//!
//! # Example
//!
//! ```
//! use tilefeed_client::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Pong {
//!     msg: String,
//! }
//!
//! let pong = Pong { msg: "pong".to_string() };
//! let encoded = JsonCodec::encode(&pong).unwrap();
//! assert_eq!(encoded, r#"{"msg":"pong"}"#);
//! let decoded: Pong = JsonCodec::decode(encoded.as_bytes()).unwrap();
//! assert_eq!(decoded, pong);
//! ```

use serde_json::Value;

use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not valid JSON for type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode JSON bytes to an untyped value tree.
    #[inline]
    pub fn decode_value(bytes: &[u8]) -> Result<Value> {
        Self::decode(bytes)
    }

    /// Convert an already-parsed value into a typed one.
    #[inline]
    pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }
}

//! Codec module - serialization/deserialization for feed payloads.
//!
//! - [`JsonCodec`] - JSON text using `serde_json`
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the call sites stay monomorphic.

mod json;

pub use json::JsonCodec;

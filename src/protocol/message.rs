//! Structured messages cut from the inflated byte stream.
//!
//! Servers batch records in one of three shapes, all normalized to an
//! ordered list of [`MessageRecord`]s:
//!
//! - `[{"msg":"map",...},{"msg":"ping"}]`
//! - `{"msgs":[{"msg":"map",...},{"msg":"ping"}]}`
//! - `{"msg":"ping"}`
//!
//! An element without a string `msg` field is set aside as a
//! [`RejectedRecord`]; the other records of the batch are kept.
//!
//! # Example
//!
//! ```
//! use tilefeed_client::protocol::MessageValue;
//!
//! let value = MessageValue::parse(br#"{"msgs":[{"msg":"ping"},{"msg":"chat","text":"hi"}]}"#)
//!     .unwrap();
//! assert_eq!(value.len(), 2);
//! assert_eq!(value.records()[1].kind(), "chat");
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::codec::JsonCodec;
use crate::error::TilefeedError;

/// Name of the discriminant field every record carries.
pub const KIND_FIELD: &str = "msg";

/// Name of the wrapper field holding a record list.
pub const BATCH_FIELD: &str = "msgs";

/// One message record: a JSON object with a string `msg` discriminant.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    kind: String,
    fields: Map<String, Value>,
}

impl MessageRecord {
    /// Build a record from a JSON value.
    ///
    /// Returns `None` if the value is not an object with a string `msg` field.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => {
                let kind = fields.get(KIND_FIELD)?.as_str()?.to_string();
                Some(Self { kind, fields })
            }
            _ => None,
        }
    }

    /// The routing discriminant (`"map"`, `"ping"`, ...).
    #[inline]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Look up a field by name.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// All fields, including the discriminant.
    #[inline]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Deserialize the whole record into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> crate::error::Result<T> {
        JsonCodec::from_value(Value::Object(self.fields.clone()))
    }

    /// Convert back into a plain JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl std::fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// A batch element that is not a usable record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    /// Position in the batch, counting rejected elements.
    pub index: usize,
    pub reason: String,
}

impl RejectedRecord {
    /// Report as a malformed record with no known kind.
    pub fn into_error(self) -> TilefeedError {
        TilefeedError::MalformedRecord {
            kind: String::new(),
            reason: self.reason,
        }
    }
}

/// One complete top-level value from the stream, as ordered records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageValue {
    records: Vec<MessageRecord>,
    /// Sorted by index.
    rejected: Vec<RejectedRecord>,
}

impl MessageValue {
    /// Parse the bytes of one complete top-level value.
    ///
    /// On failure returns a human-readable reason; the caller attaches
    /// stream position and reports it as a malformed value.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let value = JsonCodec::decode_value(bytes).map_err(|e| e.to_string())?;
        Self::from_json(value)
    }

    /// Normalize an already-parsed JSON value into records.
    pub fn from_json(value: Value) -> std::result::Result<Self, String> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut fields) => match fields.remove(BATCH_FIELD) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    fields.insert(BATCH_FIELD.to_string(), other);
                    vec![Value::Object(fields)]
                }
                None => vec![Value::Object(fields)],
            },
            other => return Err(format!("top-level value is not an object or array: {}", other)),
        };

        let mut value = Self::default();
        for (index, item) in items.into_iter().enumerate() {
            match MessageRecord::from_value(item) {
                Some(record) => value.records.push(record),
                None => value.rejected.push(RejectedRecord {
                    index,
                    reason: format!("record {} has no string \"{}\" field", index, KIND_FIELD),
                }),
            }
        }

        Ok(value)
    }

    /// Records in wire order.
    #[inline]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Elements that were not records.
    #[inline]
    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    /// Records and rejected elements interleaved in wire order.
    pub fn into_entries(self) -> Vec<std::result::Result<MessageRecord, RejectedRecord>> {
        let total = self.records.len() + self.rejected.len();
        let mut records = self.records.into_iter();
        let mut rejected = self.rejected.into_iter().peekable();

        (0..total)
            .filter_map(|i| match rejected.next_if(|r| r.index == i) {
                Some(r) => Some(Err(r)),
                None => records.next().map(Ok),
            })
            .collect()
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the value held no records (e.g. `[]`). Rejected elements
    /// are not counted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for MessageValue {
    type Item = MessageRecord;
    type IntoIter = std::vec::IntoIter<MessageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

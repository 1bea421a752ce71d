//! Value buffer for cutting concatenated JSON values out of a byte stream.
//!
//! The inflated stream is a run of top-level JSON objects/arrays with no
//! length prefix and no separator. Boundaries come from the syntax alone,
//! so the buffer runs a small scanner over the bytes:
//!
//! - `Idle`: between values, skipping whitespace until `{` or `[`
//! - `StrayString`: inside a quoted run that belongs to no value
//! - `InValue`: matching brackets on a stack, tracking string literals and
//!   `\` escapes
//!
//! A closer that does not match the innermost open bracket ends the value
//! there, so one bad value never swallows the ones after it. Bytes outside
//! any value are counted and reported once per run, either when the next
//! value starts or when the buffered data runs out.
//!
//! Scanner state survives across [`ValueBuffer::push`] calls, so a value may
//! be split at any byte, including inside a string or right after a
//! backslash. Bytes already scanned are never rescanned.
//!
//! # Example
//!
//! ```
//! use tilefeed_client::protocol::ValueBuffer;
//!
//! let mut buffer = ValueBuffer::new();
//!
//! // Data arrives in arbitrary chunks
//! assert_eq!(buffer.push(br#"[{"msg":"pi"#).count(), 0);
//!
//! for value in buffer.push(br#"ng"}][{"msg":"map","cells":[]}]"#) {
//!     let value = value.unwrap();
//!     println!("got {} records", value.len());
//! }
//! ```

use bytes::{Buf, Bytes, BytesMut};

use super::MessageValue;
use crate::error::{Result, TilefeedError};

/// Default maximum size of a single buffered value: 16 MiB.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// State machine for value scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between values.
    Idle,
    /// Inside a string literal outside any value.
    StrayString {
        /// Previous byte was a backslash.
        escaped: bool,
    },
    /// Inside a top-level value.
    InValue {
        /// Inside a string literal.
        in_string: bool,
        /// Previous byte was a backslash inside a string.
        escaped: bool,
    },
}

/// Buffer for accumulating inflated bytes and extracting complete values.
#[derive(Debug)]
pub struct ValueBuffer {
    /// Unconsumed bytes; in `InValue`, index 0 is the value's opening bracket.
    buffer: BytesMut,
    /// Bytes of `buffer` already scanned.
    scanned: usize,
    /// Current scanner state.
    state: State,
    /// Closers owed by the current value, innermost last.
    open: Vec<u8>,
    /// Stream offset of `buffer[0]`.
    stream_offset: u64,
    /// Stray bytes skipped since the last value, not yet reported.
    stray: usize,
    /// Stream offset of the first unreported stray byte.
    stray_offset: u64,
    /// Maximum allowed size of one value.
    max_value_size: usize,
}

impl ValueBuffer {
    /// Create a new value buffer with default settings.
    ///
    /// Default capacity: 64KB, max value: 16MB.
    pub fn new() -> Self {
        Self::with_max_value_size(DEFAULT_MAX_VALUE_SIZE)
    }

    /// Create a new value buffer with a custom max value size.
    pub fn with_max_value_size(max_value_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            scanned: 0,
            state: State::Idle,
            open: Vec::new(),
            stream_offset: 0,
            stray: 0,
            stray_offset: 0,
            max_value_size,
        }
    }

    /// Push data into the buffer and iterate over the values it completes.
    ///
    /// The iterator is lazy: scanning happens as it is pulled. Values not
    /// pulled before it is dropped stay buffered and come out of the next
    /// `push` or [`values`](Self::values).
    ///
    /// Items are `Err` for malformed values (recoverable, scanning continues
    /// after the bad value) and for [`TilefeedError::ValueTooLarge`] (fatal).
    pub fn push(&mut self, data: &[u8]) -> Values<'_> {
        self.buffer.extend_from_slice(data);
        Values { buffer: self }
    }

    /// Iterate over values already buffered, without adding data.
    pub fn values(&mut self) -> Values<'_> {
        Values { buffer: self }
    }

    /// Scan forward until one value (or error) is complete.
    fn next_value(&mut self) -> Option<Result<MessageValue>> {
        loop {
            if self.scanned >= self.buffer.len() {
                if self.stray > 0 {
                    return Some(Err(self.take_stray_error()));
                }
                return self.check_size();
            }

            let byte = self.buffer[self.scanned];

            match &mut self.state {
                State::Idle => match byte {
                    b'{' | b'[' => {
                        self.open.clear();
                        self.open.push(closer(byte));
                        self.state = State::InValue {
                            in_string: false,
                            escaped: false,
                        };
                        self.scanned = 1;

                        if self.stray > 0 {
                            return Some(Err(self.take_stray_error()));
                        }
                    }
                    b' ' | b'\t' | b'\r' | b'\n' => self.discard_front(),
                    b'"' => {
                        self.state = State::StrayString { escaped: false };
                        self.skip_stray();
                    }
                    _ => self.skip_stray(),
                },

                State::StrayString { escaped } => {
                    if *escaped {
                        *escaped = false;
                    } else if byte == b'\\' {
                        *escaped = true;
                    } else if byte == b'"' {
                        self.state = State::Idle;
                    }
                    self.skip_stray();
                }

                State::InValue { in_string, escaped } => {
                    self.scanned += 1;

                    if *in_string {
                        if *escaped {
                            *escaped = false;
                        } else if byte == b'\\' {
                            *escaped = true;
                        } else if byte == b'"' {
                            *in_string = false;
                        }
                        continue;
                    }

                    match byte {
                        b'"' => *in_string = true,
                        b'{' | b'[' => self.open.push(closer(byte)),
                        b'}' | b']' => match self.open.pop() {
                            Some(expected) if expected == byte => {
                                if self.open.is_empty() {
                                    return Some(self.take_value());
                                }
                            }
                            expected => return Some(Err(self.take_mismatched(byte, expected))),
                        },
                        _ => {}
                    }
                }
            }
        }
    }

    /// Cut the scanned bytes off the front of the buffer and go idle.
    fn cut(&mut self) -> (u64, Bytes) {
        let bytes = self.buffer.split_to(self.scanned).freeze();
        let offset = self.stream_offset;

        self.stream_offset += bytes.len() as u64;
        self.scanned = 0;
        self.state = State::Idle;
        self.open.clear();

        tracing::trace!(
            offset,
            len = bytes.len(),
            raw = %String::from_utf8_lossy(&bytes),
            "extracted value"
        );

        (offset, bytes)
    }

    /// Cut the completed value off the front of the buffer and parse it.
    fn take_value(&mut self) -> Result<MessageValue> {
        let (offset, bytes) = self.cut();
        MessageValue::parse(&bytes)
            .map_err(|reason| TilefeedError::MalformedValue { offset, reason })
    }

    /// End the current value at a closer of the wrong kind.
    fn take_mismatched(&mut self, found: u8, expected: Option<u8>) -> TilefeedError {
        let (offset, _) = self.cut();
        let reason = match expected {
            Some(expected) => format!(
                "'{}' where '{}' was expected",
                found as char, expected as char
            ),
            None => format!("unbalanced '{}'", found as char),
        };
        TilefeedError::MalformedValue { offset, reason }
    }

    fn take_stray_error(&mut self) -> TilefeedError {
        let count = std::mem::take(&mut self.stray);
        TilefeedError::MalformedValue {
            offset: self.stray_offset,
            reason: format!("{} stray bytes outside any value", count),
        }
    }

    /// Count and drop one byte that belongs to no value.
    fn skip_stray(&mut self) {
        if self.stray == 0 {
            self.stray_offset = self.stream_offset;
        }
        self.stray += 1;
        self.discard_front();
    }

    /// Drop one idle byte from the front.
    fn discard_front(&mut self) {
        self.buffer.advance(1);
        self.stream_offset += 1;
    }

    /// Enforce the size limit on an incomplete value.
    fn check_size(&mut self) -> Option<Result<MessageValue>> {
        if matches!(self.state, State::InValue { .. }) && self.buffer.len() > self.max_value_size
        {
            let size = self.buffer.len();
            self.clear();
            return Some(Err(TilefeedError::ValueTooLarge {
                size,
                max: self.max_value_size,
            }));
        }
        None
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Stream offset of the next unconsumed byte.
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Whether the scanner is part-way through a value.
    pub fn has_partial_value(&self) -> bool {
        matches!(self.state, State::InValue { .. })
    }

    /// Discard buffered bytes and reset scanner state.
    ///
    /// Used on connection teardown; a partial value is dropped, not flushed.
    pub fn clear(&mut self) {
        self.stream_offset += self.buffer.len() as u64;
        self.buffer.clear();
        self.scanned = 0;
        self.state = State::Idle;
        self.open.clear();
        self.stray = 0;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Idle => "Idle",
            State::StrayString { .. } => "StrayString",
            State::InValue {
                in_string: true, ..
            } => "InString",
            State::InValue { .. } => "InValue",
        }
    }
}

/// The byte that closes `opener`.
fn closer(opener: u8) -> u8 {
    if opener == b'{' {
        b'}'
    } else {
        b']'
    }
}

impl Default for ValueBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over values completed by buffered bytes.
pub struct Values<'a> {
    buffer: &'a mut ValueBuffer,
}

impl Iterator for Values<'_> {
    type Item = Result<MessageValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(buffer: &mut ValueBuffer, data: &[u8]) -> Vec<Result<MessageValue>> {
        buffer.push(data).collect()
    }

    fn kinds(value: &MessageValue) -> Vec<&str> {
        value.records().iter().map(|r| r.kind()).collect()
    }

    #[test]
    fn test_single_complete_value() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"[{"msg":"ping"}]"#);

        assert_eq!(values.len(), 1);
        assert_eq!(kinds(values[0].as_ref().unwrap()), vec!["ping"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_values_in_one_push() {
        let mut buffer = ValueBuffer::new();

        let values = collect(
            &mut buffer,
            br#"[{"msg":"a"}]{"msg":"b"}{"msgs":[{"msg":"c"},{"msg":"d"}]}"#,
        );

        assert_eq!(values.len(), 3);
        assert_eq!(kinds(values[0].as_ref().unwrap()), vec!["a"]);
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["b"]);
        assert_eq!(kinds(values[2].as_ref().unwrap()), vec!["c", "d"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_whitespace_between_values() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, b" \n[{\"msg\":\"a\"}]\r\n\t {\"msg\":\"b\"} ");

        assert_eq!(values.len(), 2);
        assert!(values.iter().all(|v| v.is_ok()));
        assert!(buffer.is_empty());
        assert_eq!(buffer.stream_offset(), 31);
    }

    #[test]
    fn test_split_inside_string() {
        let mut buffer = ValueBuffer::new();
        let data = br#"[{"msg":"chat","text":"a]b}c"}]"#;

        // Split right after the bracket inside the string literal
        let split = 25;
        assert!(collect(&mut buffer, &data[..split]).is_empty());
        assert_eq!(buffer.state_name(), "InString");

        let values = collect(&mut buffer, &data[split..]);
        assert_eq!(values.len(), 1);
        let value = values[0].as_ref().unwrap();
        assert_eq!(value.records()[0].get("text").unwrap(), "a]b}c");
    }

    #[test]
    fn test_escaped_quote_split_after_backslash() {
        let mut buffer = ValueBuffer::new();
        let data = br#"{"msg":"chat","text":"say \"}\" now"}"#;
        let backslash = data.iter().position(|&b| b == b'\\').unwrap();

        assert!(collect(&mut buffer, &data[..=backslash]).is_empty());
        assert_eq!(buffer.state_name(), "InString");

        let values = collect(&mut buffer, &data[backslash + 1..]);
        assert_eq!(values.len(), 1);
        let value = values[0].as_ref().unwrap();
        assert_eq!(value.records()[0].get("text").unwrap(), "say \"}\" now");
    }

    #[test]
    fn test_escaped_backslash_before_closing_quote() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"{"msg":"path","p":"C:\\"}{"msg":"x"}"#);

        assert_eq!(values.len(), 2);
        assert_eq!(
            values[0].as_ref().unwrap().records()[0].get("p").unwrap(),
            "C:\\"
        );
    }

    #[test]
    fn test_multibyte_utf8_split() {
        let mut buffer = ValueBuffer::new();
        let data = "{\"msg\":\"map\",\"g\":\"\u{2593}\"}".as_bytes();
        let glyph_start = data.iter().position(|&b| b >= 0x80).unwrap();

        assert!(collect(&mut buffer, &data[..glyph_start + 1]).is_empty());
        let values = collect(&mut buffer, &data[glyph_start + 1..]);

        assert_eq!(values.len(), 1);
        assert_eq!(
            values[0].as_ref().unwrap().records()[0].get("g").unwrap(),
            "\u{2593}"
        );
    }

    #[test]
    fn test_nested_brackets() {
        let mut buffer = ValueBuffer::new();

        let values = collect(
            &mut buffer,
            br##"[{"msg":"map","cells":[{"x":0,"y":0,"g":"#"},{"g":"["}],"m":{"a":[[]]}}]"##,
        );

        assert_eq!(values.len(), 1);
        assert!(values[0].is_ok());
    }

    #[test]
    fn test_malformed_then_valid_in_one_push() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"{"msg":"bad",}[{"msg":"ok"}]"#);

        assert_eq!(values.len(), 2);
        assert!(matches!(
            values[0],
            Err(TilefeedError::MalformedValue { offset: 0, .. })
        ));
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ok"]);
    }

    #[test]
    fn test_mismatched_brackets_are_malformed() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"{"msg":"x"]{"msg":"y"}"#);

        assert_eq!(values.len(), 2);
        assert!(values[0].is_err());
        assert!(values[1].is_ok());
    }

    #[test]
    fn test_mismatched_closer_ends_value() {
        let mut buffer = ValueBuffer::new();

        let values = collect(
            &mut buffer,
            br#"{"msg":"bad","a":[}{"msg":"ping"}[{"msg":"map","cells":[]}]"#,
        );

        assert_eq!(values.len(), 3);
        match &values[0] {
            Err(TilefeedError::MalformedValue { offset, reason }) => {
                assert_eq!(*offset, 0);
                assert!(reason.contains("']' was expected"));
            }
            other => panic!("expected malformed value, got {:?}", other),
        }
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ping"]);
        assert_eq!(kinds(values[2].as_ref().unwrap()), vec!["map"]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "Idle");
    }

    #[test]
    fn test_mismatched_closer_split_across_pushes() {
        let mut buffer = ValueBuffer::new();

        assert!(collect(&mut buffer, br#"[{"a":[1,{"b":2"#).is_empty());
        let values = collect(&mut buffer, br#"]{"msg":"ok"}"#);

        assert_eq!(values.len(), 2);
        assert!(matches!(
            values[0],
            Err(TilefeedError::MalformedValue { offset: 0, .. })
        ));
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ok"]);
    }

    #[test]
    fn test_record_without_kind_keeps_siblings() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"[{"msg":"a"},{"cells":[]},{"msg":"b"}]"#);

        assert_eq!(values.len(), 1);
        let value = values[0].as_ref().unwrap();
        assert_eq!(kinds(value), vec!["a", "b"]);
        assert_eq!(value.rejected().len(), 1);
        assert_eq!(value.rejected()[0].index, 1);
    }

    #[test]
    fn test_stray_bytes_reported_once() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"garbage 123 }{"msg":"ok"}"#);

        assert_eq!(values.len(), 2);
        match &values[0] {
            Err(TilefeedError::MalformedValue { offset, reason }) => {
                assert_eq!(*offset, 0);
                assert!(reason.contains("11 stray bytes"));
            }
            other => panic!("expected stray error, got {:?}", other),
        }
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ok"]);
    }

    #[test]
    fn test_trailing_stray_bytes_reported() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#"{"msg":"a"} garbage"#);

        assert_eq!(values.len(), 2);
        assert_eq!(kinds(values[0].as_ref().unwrap()), vec!["a"]);
        match &values[1] {
            Err(TilefeedError::MalformedValue { offset, reason }) => {
                assert_eq!(*offset, 12);
                assert!(reason.contains("7 stray bytes"));
            }
            other => panic!("expected stray error, got {:?}", other),
        }
        assert!(buffer.is_empty());

        // Already reported; the next value comes out clean
        let values = collect(&mut buffer, br#"{"msg":"b"}"#);
        assert_eq!(values.len(), 1);
        assert!(values[0].is_ok());
    }

    #[test]
    fn test_stray_string_is_skipped_whole() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#""a{b" {"msg":"ok"}"#);

        assert_eq!(values.len(), 2);
        match &values[0] {
            Err(TilefeedError::MalformedValue { offset, reason }) => {
                assert_eq!(*offset, 0);
                assert!(reason.contains("5 stray bytes"));
            }
            other => panic!("expected stray error, got {:?}", other),
        }
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ok"]);
    }

    #[test]
    fn test_stray_string_split_after_backslash() {
        let mut buffer = ValueBuffer::new();

        let values = collect(&mut buffer, br#""x\"#);
        assert_eq!(values.len(), 1);
        assert!(values[0].is_err());
        assert_eq!(buffer.state_name(), "StrayString");

        // The escaped quote does not end the run; the brace is still stray
        let values = collect(&mut buffer, br#""{" {"msg":"ok"}"#);
        assert_eq!(values.len(), 2);
        match &values[0] {
            Err(TilefeedError::MalformedValue { offset, reason }) => {
                assert_eq!(*offset, 3);
                assert!(reason.contains("3 stray bytes"));
            }
            other => panic!("expected stray error, got {:?}", other),
        }
        assert_eq!(kinds(values[1].as_ref().unwrap()), vec!["ok"]);
    }

    #[test]
    fn test_malformed_offset_is_stream_position() {
        let mut buffer = ValueBuffer::new();

        let first = br#"{"msg":"a"}"#;
        assert_eq!(collect(&mut buffer, first).len(), 1);

        let values = collect(&mut buffer, br#"{"msg":}"#);
        match &values[0] {
            Err(TilefeedError::MalformedValue { offset, .. }) => {
                assert_eq!(*offset, first.len() as u64)
            }
            other => panic!("expected malformed value, got {:?}", other),
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = ValueBuffer::new();
        let data = br#"[{"msg":"map","cells":[{"x":-1,"y":2,"g":"\""}]}] {"msg":"ping"}"#;

        let mut all = Vec::new();
        for byte in data.iter() {
            all.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all.len(), 2);
        assert_eq!(kinds(all[0].as_ref().unwrap()), vec!["map"]);
        assert_eq!(kinds(all[1].as_ref().unwrap()), vec!["ping"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unpulled_values_survive_iterator_drop() {
        let mut buffer = ValueBuffer::new();

        {
            let mut values = buffer.push(br#"{"msg":"a"}{"msg":"b"}"#);
            assert!(values.next().unwrap().is_ok());
        }

        let rest: Vec<_> = buffer.values().collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(kinds(rest[0].as_ref().unwrap()), vec!["b"]);
    }

    #[test]
    fn test_max_value_size() {
        let mut buffer = ValueBuffer::with_max_value_size(16);

        let values = collect(&mut buffer, br#"{"msg":"this value is too long"#);

        assert_eq!(values.len(), 1);
        assert!(matches!(
            values[0],
            Err(TilefeedError::ValueTooLarge { max: 16, .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_value_within_limit() {
        let mut buffer = ValueBuffer::with_max_value_size(64);
        let data = br#"{"msg":"ok","pad":"0123456789"}"#;

        let values = collect(&mut buffer, data);
        assert_eq!(values.len(), 1);
        assert!(values[0].is_ok());
    }

    #[test]
    fn test_clear_resets_state() {
        let mut buffer = ValueBuffer::new();

        assert!(collect(&mut buffer, br#"{"msg":"par"#).is_empty());
        assert!(buffer.has_partial_value());
        assert_eq!(buffer.state_name(), "InString");

        buffer.clear();

        assert_eq!(buffer.state_name(), "Idle");
        assert!(buffer.is_empty());

        let values = collect(&mut buffer, br#"{"msg":"next"}"#);
        assert_eq!(kinds(values[0].as_ref().unwrap()), vec!["next"]);
    }
}

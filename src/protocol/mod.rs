//! Protocol module - inflating frames and cutting messages from the stream.
//!
//! This module implements the inbound half of the feed:
//! - [`FrameInflater`]: one raw-deflate context shared by every frame
//! - [`ValueBuffer`]: incremental splitter for concatenated JSON values
//! - [`MessageValue`] / [`MessageRecord`]: normalized message records

mod inflater;
mod message;
mod value_buffer;

pub use inflater::{FrameInflater, DEFAULT_INFLATE_CHUNK_SIZE, FLUSH_MARKER};
pub use message::{MessageRecord, MessageValue, RejectedRecord, BATCH_FIELD, KIND_FIELD};
pub use value_buffer::{ValueBuffer, Values, DEFAULT_MAX_VALUE_SIZE};

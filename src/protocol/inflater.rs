//! Context-takeover inflater for per-message compressed frames.
//!
//! Each inbound frame is a raw (headerless) deflate fragment that was
//! flushed with a sync flush on the sending side, with the trailing
//! `00 00 FF FF` empty stored block stripped. The marker is appended back
//! before inflating so the decoder knows the fragment is complete.
//!
//! One [`flate2::Decompress`] lives for the whole connection. Back-references
//! in frame N may point into output of any earlier frame, so the context is
//! never reset. Once it reports invalid data it is poisoned: every later call
//! fails, there is no resynchronization.
//!
//! # Example
//!
//! ```
//! use flate2::{Compress, Compression, FlushCompress};
//! use tilefeed_client::protocol::{FrameInflater, FLUSH_MARKER};
//!
//! let mut compress = Compress::new(Compression::default(), false);
//! let mut frame = Vec::with_capacity(128);
//! compress
//!     .compress_vec(br#"[{"msg":"ping"}]"#, &mut frame, FlushCompress::Sync)
//!     .unwrap();
//! frame.truncate(frame.len() - FLUSH_MARKER.len());
//!
//! let mut inflater = FrameInflater::new();
//! let out = inflater.feed(&frame).unwrap();
//! assert_eq!(&out[..], br#"[{"msg":"ping"}]"#);
//! ```

use bytes::{Bytes, BytesMut};
use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Result, TilefeedError};

/// Empty stored block that terminates every sync-flushed fragment.
pub const FLUSH_MARKER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Default size of the scratch buffer inflate output is staged through.
pub const DEFAULT_INFLATE_CHUNK_SIZE: usize = 32 * 1024;

/// Inflater state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Accepting frames.
    Streaming,
    /// A final deflate block was decoded; context takeover cannot continue.
    Finished,
    /// Invalid data was seen; the context is unusable.
    Poisoned(String),
}

/// Turns a sequence of compressed frames into one continuous byte stream.
#[derive(Debug)]
pub struct FrameInflater {
    /// The single compression context for this connection.
    decompress: Decompress,
    /// Frame bytes plus flush marker for the current call.
    input: BytesMut,
    /// Staging buffer for inflate output.
    scratch: Vec<u8>,
    state: State,
}

impl FrameInflater {
    /// Create a new inflater with the default chunk size.
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_INFLATE_CHUNK_SIZE)
    }

    /// Create a new inflater that stages output through `chunk_size` bytes.
    ///
    /// The chunk size only affects how many inflate calls one frame needs,
    /// never the output.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            decompress: Decompress::new(false),
            input: BytesMut::new(),
            scratch: vec![0u8; chunk_size.max(1)],
            state: State::Streaming,
        }
    }

    /// Inflate one frame and return the bytes it produced.
    ///
    /// The returned bytes directly continue the output of the previous call.
    ///
    /// # Errors
    ///
    /// Returns [`TilefeedError::Decompression`] if the data is invalid, if the
    /// stream already ended, or if the inflater was poisoned by an earlier
    /// failure. All of these are fatal for the connection.
    pub fn feed(&mut self, frame: &[u8]) -> Result<Bytes> {
        match &self.state {
            State::Streaming => {}
            State::Finished => {
                if frame.is_empty() {
                    return Ok(Bytes::new());
                }
                return Err(TilefeedError::Decompression(
                    "frame received after final deflate block".to_string(),
                ));
            }
            State::Poisoned(reason) => {
                return Err(TilefeedError::Decompression(format!(
                    "inflater poisoned by earlier error: {}",
                    reason
                )));
            }
        }

        // A bare marker is not a block; feeding it would desync the context.
        if frame.is_empty() {
            return Ok(Bytes::new());
        }

        self.input.clear();
        self.input.extend_from_slice(frame);
        self.input.extend_from_slice(&FLUSH_MARKER);

        match self.inflate_input() {
            Ok(out) => Ok(out),
            Err(reason) => {
                self.state = State::Poisoned(reason.clone());
                Err(TilefeedError::Decompression(reason))
            }
        }
    }

    fn inflate_input(&mut self) -> std::result::Result<Bytes, String> {
        let mut out = BytesMut::new();
        let mut offset = 0;

        loop {
            let prev_in = self.decompress.total_in();
            let prev_out = self.decompress.total_out();

            let status = self
                .decompress
                .decompress(
                    &self.input[offset..],
                    &mut self.scratch,
                    FlushDecompress::Sync,
                )
                .map_err(|e| e.to_string())?;

            let consumed = (self.decompress.total_in() - prev_in) as usize;
            let produced = (self.decompress.total_out() - prev_out) as usize;

            offset += consumed;
            out.extend_from_slice(&self.scratch[..produced]);

            if status == Status::StreamEnd {
                self.state = State::Finished;
                break;
            }

            // A full scratch buffer may hide more pending output.
            if offset >= self.input.len() && produced < self.scratch.len() {
                break;
            }

            if consumed == 0 && produced == 0 {
                if offset < self.input.len() {
                    return Err(format!(
                        "inflater stalled with {} unread bytes",
                        self.input.len() - offset
                    ));
                }
                break;
            }
        }

        tracing::trace!(
            frame_len = self.input.len() - FLUSH_MARKER.len(),
            inflated = out.len(),
            "inflated frame"
        );

        Ok(out.freeze())
    }

    /// Total compressed bytes consumed, flush markers included.
    pub fn total_in(&self) -> u64 {
        self.decompress.total_in()
    }

    /// Total decompressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.decompress.total_out()
    }

    /// Whether a fatal error has made this inflater unusable.
    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, State::Poisoned(_))
    }

    /// Whether the sender closed the deflate stream with a final block.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }
}

impl Default for FrameInflater {
    fn default() -> Self {
        Self::new()
    }
}

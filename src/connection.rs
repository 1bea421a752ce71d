//! Per-connection pipeline: inflate, extract, dispatch, apply.
//!
//! A [`Connection`] owns one [`FrameInflater`], one [`ValueBuffer`] and one
//! [`GridState`]. Nothing is shared between connections, so two feeds never
//! interfere. [`Connection::feed`] is synchronous and runs one frame all the
//! way through, returning what happened as [`Event`]s in wire order.
//!
//! # Example
//!
//! ```
//! use flate2::{Compress, Compression, FlushCompress};
//! use tilefeed_client::connection::{Connection, Event};
//!
//! // What a permessage-deflate sender puts on the wire
//! let mut deflate = Compress::new(Compression::default(), false);
//! let mut frame = Vec::with_capacity(256);
//! deflate
//!     .compress_vec(br##"{"msg":"map","cells":[{"x":0,"y":0,"g":"#"}]}"##, &mut frame, FlushCompress::Sync)
//!     .unwrap();
//! frame.truncate(frame.len() - 4);
//!
//! let mut conn = Connection::builder().build();
//! let events = conn.feed(&frame).unwrap();
//! assert!(matches!(events[0], Event::MapUpdated(_)));
//! assert_eq!(conn.snapshot().to_string(), "0,0 - 0,0\n#\n");
//! ```

use tracing::{debug, error, warn};

use crate::error::{Result, TilefeedError};
use crate::grid::{Coord, DeltaReport, GridState, RowWrap, Snapshot};
use crate::handler::{Dispatched, Route, RouteTable};
use crate::protocol::{
    FrameInflater, MessageRecord, ValueBuffer, DEFAULT_INFLATE_CHUNK_SIZE, DEFAULT_MAX_VALUE_SIZE,
};

/// Largest map, in cells, that debug logging renders after an update.
pub const MAX_DEBUG_DUMP_AREA: u64 = 64 * 1024;

/// Something a fed frame produced.
#[derive(Debug)]
pub enum Event {
    /// A map record was applied to the grid.
    MapUpdated(DeltaReport),
    /// A keepalive record arrived and should be answered.
    Keepalive(MessageRecord),
    /// A record this crate does not interpret.
    Record(MessageRecord),
    /// A value or record was skipped. The pipeline continues.
    Malformed(TilefeedError),
}

/// Builder for configuring a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    origin: Coord,
    row_wrap: Option<RowWrap>,
    max_value_size: usize,
    inflate_chunk_size: usize,
    routes: RouteTable,
}

impl ConnectionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            origin: Coord::default(),
            row_wrap: None,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            inflate_chunk_size: DEFAULT_INFLATE_CHUNK_SIZE,
            routes: RouteTable::new(),
        }
    }

    /// Offset added to every absolute cell coordinate.
    ///
    /// Default: (0, 0)
    pub fn origin(mut self, x: i64, y: i64) -> Self {
        self.origin = Coord::new(x, y);
        self
    }

    /// Wrap carry-forward deltas back to `start_x` after `width` columns.
    ///
    /// Default: unbounded rows
    pub fn row_wrap(mut self, start_x: i64, width: u64) -> Self {
        self.row_wrap = Some(RowWrap::new(start_x, width));
        self
    }

    /// Largest single value the extractor will buffer.
    ///
    /// Default: 16 MiB
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Output buffer step for the inflater.
    ///
    /// Default: 32 KiB
    pub fn inflate_chunk_size(mut self, size: usize) -> Self {
        self.inflate_chunk_size = size;
        self
    }

    /// Route records tagged `kind` to `route`.
    pub fn route(mut self, kind: &str, route: Route) -> Self {
        self.routes.register(kind, route);
        self
    }

    /// Build the connection.
    pub fn build(self) -> Connection {
        let mut grid = GridState::new().with_origin(self.origin);
        if let Some(wrap) = self.row_wrap {
            grid = grid.with_row_wrap(wrap);
        }

        Connection {
            inflater: Some(FrameInflater::with_chunk_size(self.inflate_chunk_size)),
            values: ValueBuffer::with_max_value_size(self.max_value_size),
            grid,
            routes: self.routes,
        }
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One feed's decoding state.
#[derive(Debug)]
pub struct Connection {
    /// `None` once closed.
    inflater: Option<FrameInflater>,
    values: ValueBuffer,
    grid: GridState,
    routes: RouteTable,
}

impl Connection {
    /// Create a connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Run one compressed frame through the pipeline.
    ///
    /// Recoverable problems come back as [`Event::Malformed`] (and skipped
    /// cell deltas inside [`DeltaReport`]). A fatal error closes the
    /// connection and is returned; later calls fail with
    /// [`TilefeedError::ConnectionClosed`].
    pub fn feed(&mut self, frame: &[u8]) -> Result<Vec<Event>> {
        let inflater = self
            .inflater
            .as_mut()
            .ok_or(TilefeedError::ConnectionClosed)?;

        let inflated = match inflater.feed(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Inflate failed, closing connection: {}", e);
                self.close();
                return Err(e);
            }
        };
        debug!(
            compressed = frame.len(),
            inflated = inflated.len(),
            "Inflated frame"
        );

        let mut events = Vec::new();
        let mut fatal = None;

        for item in self.values.push(&inflated) {
            let value = match item {
                Ok(value) => value,
                Err(e) if e.is_fatal() => {
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    warn!("Skipping malformed value: {}", e);
                    events.push(Event::Malformed(e));
                    continue;
                }
            };

            for entry in value.into_entries() {
                let record = match entry {
                    Ok(record) => record,
                    Err(rejected) => {
                        let e = rejected.into_error();
                        warn!("Skipping record: {}", e);
                        events.push(Event::Malformed(e));
                        continue;
                    }
                };

                match self.routes.dispatch(record, &mut self.grid) {
                    Ok(Dispatched::Map(report)) => {
                        if tracing::enabled!(tracing::Level::DEBUG) {
                            Self::log_map(&self.grid);
                        }
                        events.push(Event::MapUpdated(report));
                    }
                    Ok(Dispatched::Keepalive(record)) => events.push(Event::Keepalive(record)),
                    Ok(Dispatched::PassThrough(record)) => events.push(Event::Record(record)),
                    Err(e) => {
                        warn!("Skipping record: {}", e);
                        events.push(Event::Malformed(e));
                    }
                }
            }
        }

        if let Some(e) = fatal {
            error!("Extractor failed, closing connection: {}", e);
            self.close();
            return Err(e);
        }

        Ok(events)
    }

    fn log_map(grid: &GridState) {
        match grid.snapshot_within(MAX_DEBUG_DUMP_AREA) {
            Some(snapshot) => debug!("Map after update:\n{}", snapshot),
            None => debug!(
                cells = grid.len(),
                bounds = ?grid.bounds(),
                "Map after update too large to render"
            ),
        }
    }

    /// Tear down the decoding state.
    ///
    /// The inflate context and any partial value bytes are discarded. The
    /// grid is kept and stays readable.
    pub fn close(&mut self) {
        if self.inflater.take().is_some() {
            debug!(
                pending = self.values.len(),
                "Closing connection, discarding buffered bytes"
            );
        }
        self.values.clear();
    }

    /// Whether [`close`](Self::close) ran (directly or after a fatal error).
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inflater.is_none()
    }

    /// The reconstructed grid.
    #[inline]
    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    /// Render the current grid.
    pub fn snapshot(&self) -> Snapshot {
        self.grid.snapshot()
    }

    /// The routing table in use.
    #[inline]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Bytes of value data waiting for more input.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.values.len()
    }

    /// Consume the connection, keeping the grid.
    pub fn into_grid(self) -> GridState {
        self.grid
    }
}

impl Default for Connection {
    fn default() -> Self {
        ConnectionBuilder::new().build()
    }
}

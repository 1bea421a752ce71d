//! Grid module - sparse tile map rebuilt from cell deltas.
//!
//! Provides:
//! - [`GridState`] - coordinate → glyph mapping with delta decoding
//! - [`CellDelta`] / [`MapUpdate`] - the wire shape of a map update
//! - [`Snapshot`] - bounding box plus rendered character block
//!
//! # Example
//!
//! ```
//! use tilefeed_client::grid::{CellDelta, GridState};
//!
//! let mut grid = GridState::new();
//! grid.apply_deltas(&[
//!     CellDelta::at(0, 0, '#'),
//!     CellDelta::next('.'),
//!     CellDelta::skip(),
//!     CellDelta::next('@'),
//! ]);
//!
//! let snapshot = grid.snapshot();
//! assert_eq!(snapshot.to_string(), "0,0 - 3,0\n#. @\n");
//! ```

mod cell;
mod snapshot;
mod state;

pub use cell::{CellDelta, Coord, MapUpdate, RowWrap};
pub use snapshot::{BoundingBox, Snapshot, BLANK};
pub use state::{DeltaReport, GridState};

//! Cell deltas and the coordinates they resolve to.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeltaFault;

/// A signed grid coordinate. The grid has no fixed bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord {
    pub x: i64,
    pub y: i64,
}

impl Coord {
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Add an offset, failing on overflow.
    pub fn checked_offset(self, by: Coord) -> Option<Coord> {
        Some(Coord {
            x: self.x.checked_add(by.x)?,
            y: self.y.checked_add(by.y)?,
        })
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Fixed row width for consumers that need row-major wrapping.
///
/// Rows span `start_x .. start_x + width`. An implicit step off the end of
/// a row continues at `start_x` on the next row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWrap {
    pub start_x: i64,
    pub width: u64,
}

impl RowWrap {
    pub fn new(start_x: i64, width: u64) -> Self {
        Self {
            start_x,
            width: width.max(1),
        }
    }
}

/// One entry of a map update.
///
/// `x`/`y` are absolute (before the grid's origin offset) and come as a
/// pair; when both are absent the cell is the successor of the previous one.
/// Missing `g` means "position only, no change". Other per-cell fields the
/// server sends (colours, flags, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<String>,
}

impl CellDelta {
    /// Delta at an explicit coordinate.
    pub fn at(x: i64, y: i64, glyph: char) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            g: Some(glyph.to_string()),
        }
    }

    /// Delta at the successor of the previous cell.
    pub fn next(glyph: char) -> Self {
        Self {
            g: Some(glyph.to_string()),
            ..Self::default()
        }
    }

    /// Advance the cursor without writing.
    pub fn skip() -> Self {
        Self::default()
    }

    /// Decode one raw cell object from a map record.
    pub fn from_value(value: Value) -> Result<Self, DeltaFault> {
        serde_json::from_value(value).map_err(|e| DeltaFault::Unreadable(e.to_string()))
    }

    /// The glyph, if present and exactly one character.
    pub(crate) fn glyph(&self) -> Result<Option<char>, DeltaFault> {
        let Some(g) = &self.g else {
            return Ok(None);
        };
        let mut chars = g.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Some(c)),
            _ => Err(DeltaFault::BadGlyph(g.clone())),
        }
    }
}

/// Payload of a `map` record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MapUpdate {
    /// Drop every known cell before applying `cells`.
    #[serde(default)]
    pub clear: bool,
    /// Raw cell objects, decoded one by one so a bad cell only loses itself.
    #[serde(default)]
    pub cells: Vec<Value>,
}

//! Textual dump of the known part of the grid.
//!
//! Format:
//!
//! ```text
//! minX,minY - maxX,maxY
//! <row minY>
//! ...
//! <row maxY>
//! ```
//!
//! Every row is exactly `maxX - minX + 1` characters; unknown cells are
//! blanks. An empty grid dumps as `Map is empty`.

use std::io::Write;

use super::Coord;

/// Placeholder for cells with no known glyph.
pub const BLANK: char = ' ';

/// Smallest rectangle covering every known cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min: Coord,
    pub max: Coord,
}

impl BoundingBox {
    /// Box covering a single coordinate.
    pub fn point(c: Coord) -> Self {
        Self { min: c, max: c }
    }

    /// Grow to include `c`.
    pub fn include(&mut self, c: Coord) {
        self.min.x = self.min.x.min(c.x);
        self.min.y = self.min.y.min(c.y);
        self.max.x = self.max.x.max(c.x);
        self.max.y = self.max.y.max(c.y);
    }

    /// Number of columns, saturating at `u64::MAX`.
    pub fn width(&self) -> u64 {
        span(self.min.x, self.max.x)
    }

    /// Number of rows, saturating at `u64::MAX`.
    pub fn height(&self) -> u64 {
        span(self.min.y, self.max.y)
    }

    /// Number of cells a rendering would cover, saturating.
    pub fn area(&self) -> u64 {
        self.width().saturating_mul(self.height())
    }
}

fn span(min: i64, max: i64) -> u64 {
    u64::try_from(i128::from(max) - i128::from(min) + 1).unwrap_or(u64::MAX)
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.min, self.max)
    }
}

/// Rendered view of the grid at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bounds: Option<BoundingBox>,
    rows: Vec<String>,
}

impl Snapshot {
    pub(crate) fn new(bounds: Option<BoundingBox>, rows: Vec<String>) -> Self {
        Self { bounds, rows }
    }

    /// Bounding box, or `None` for an empty grid.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Rows from `minY` to `maxY`.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Whether no cell is known.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// The character block alone, rows joined by `\n`.
    pub fn render(&self) -> String {
        self.rows.join("\n")
    }

    /// Write the full dump (header line plus rows).
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(writer, "{}", self)?;
        writer.flush()
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(bounds) = self.bounds else {
            return writeln!(f, "Map is empty");
        };
        writeln!(f, "{}", bounds)?;
        for row in &self.rows {
            writeln!(f, "{}", row)?;
        }
        Ok(())
    }
}

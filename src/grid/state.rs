//! Sparse grid state revised by map updates.
//!
//! Cells live in a `HashMap` keyed directly by signed `(x, y)`, so the grid
//! has no size limit and coordinates can drift arbitrarily far from the
//! origin over a long session.
//!
//! Decoding of a batch, per delta in wire order:
//! 1. `x` and `y` present: coordinate is `(x, y)` plus the configured origin.
//! 2. both absent: successor of the previous coordinate (`x + 1`, or the
//!    next row's `start_x` when a [`RowWrap`] is configured).
//! 3. `g` present: the cell is written; absent: position only.
//!
//! The cursor starts empty for every batch. A delta whose position cannot be
//! resolved is skipped and also drops the cursor, so nothing after it is
//! written at a guessed position until the next explicit coordinate.

use std::collections::HashMap;

use super::snapshot::{BoundingBox, Snapshot, BLANK};
use super::{CellDelta, Coord, MapUpdate, RowWrap};
use crate::error::{DeltaFault, TilefeedError};

/// Outcome of applying one batch of deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaReport {
    /// The grid was cleared before the batch.
    pub cleared: bool,
    /// Deltas that wrote a glyph.
    pub written: usize,
    /// Deltas that only moved the cursor.
    pub advanced: usize,
    /// Skipped deltas, by index within the batch.
    pub skipped: Vec<(usize, DeltaFault)>,
}

impl DeltaReport {
    /// Whether every delta in the batch was decoded.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, index: usize, fault: DeltaFault) {
        tracing::warn!(index, %fault, "skipping cell delta");
        self.skipped.push((index, fault));
    }

    /// Skipped deltas as errors, for reporting.
    pub fn errors(&self) -> impl Iterator<Item = TilefeedError> + '_ {
        self.skipped
            .iter()
            .map(|(index, reason)| TilefeedError::InvalidDelta {
                index: *index,
                reason: reason.clone(),
            })
    }
}

/// Coordinate → glyph mapping for every cell seen so far.
#[derive(Debug, Clone, Default)]
pub struct GridState {
    cells: HashMap<Coord, char>,
    origin: Coord,
    row_wrap: Option<RowWrap>,
}

impl GridState {
    /// Create an empty, unbounded grid with origin `(0, 0)`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the additive offset applied to explicit coordinates.
    pub fn with_origin(mut self, origin: Coord) -> Self {
        self.origin = origin;
        self
    }

    /// Wrap implicit steps at a fixed row width.
    pub fn with_row_wrap(mut self, row_wrap: RowWrap) -> Self {
        self.row_wrap = Some(row_wrap);
        self
    }

    /// Apply an ordered batch of deltas.
    pub fn apply_deltas(&mut self, deltas: &[CellDelta]) -> DeltaReport {
        self.apply_decoded(deltas.iter().map(|d| Ok(d.clone())))
    }

    /// Apply a `map` record payload: clear first if asked, then the cells.
    pub fn apply_map_update(&mut self, update: MapUpdate) -> DeltaReport {
        let cleared = update.clear;
        if cleared {
            self.clear();
        }

        let mut report = self.apply_decoded(update.cells.into_iter().map(CellDelta::from_value));
        report.cleared = cleared;
        report
    }

    fn apply_decoded<I>(&mut self, deltas: I) -> DeltaReport
    where
        I: IntoIterator<Item = Result<CellDelta, DeltaFault>>,
    {
        let mut report = DeltaReport::default();
        let mut cursor: Option<Coord> = None;

        for (index, delta) in deltas.into_iter().enumerate() {
            let delta = match delta {
                Ok(delta) => delta,
                Err(fault) => {
                    report.skip(index, fault);
                    cursor = None;
                    continue;
                }
            };

            let coord = match self.resolve(&delta, cursor) {
                Ok(coord) => coord,
                Err(fault) => {
                    report.skip(index, fault);
                    cursor = None;
                    continue;
                }
            };

            // The position is valid even if the glyph is not.
            cursor = Some(coord);

            match delta.glyph() {
                Ok(Some(g)) => {
                    self.cells.insert(coord, g);
                    report.written += 1;
                }
                Ok(None) => report.advanced += 1,
                Err(fault) => report.skip(index, fault),
            }
        }

        report
    }

    /// Resolve the coordinate a delta refers to.
    fn resolve(&self, delta: &CellDelta, cursor: Option<Coord>) -> Result<Coord, DeltaFault> {
        match (delta.x, delta.y) {
            (Some(x), Some(y)) => Coord::new(x, y)
                .checked_offset(self.origin)
                .ok_or(DeltaFault::CoordinateOverflow),
            (None, Some(_)) => Err(DeltaFault::MissingX),
            (Some(_), None) => Err(DeltaFault::MissingY),
            (None, None) => {
                let prev = cursor.ok_or(DeltaFault::NoAnchor)?;
                self.step(prev).ok_or(DeltaFault::CoordinateOverflow)
            }
        }
    }

    /// Row-major successor of `c`.
    fn step(&self, c: Coord) -> Option<Coord> {
        let next_x = c.x.checked_add(1)?;
        match self.row_wrap {
            Some(wrap)
                if i128::from(next_x) >= i128::from(wrap.start_x) + i128::from(wrap.width) =>
            {
                Some(Coord::new(wrap.start_x, c.y.checked_add(1)?))
            }
            _ => Some(Coord::new(next_x, c.y)),
        }
    }

    /// Glyph at a coordinate, if known.
    pub fn get(&self, c: Coord) -> Option<char> {
        self.cells.get(&c).copied()
    }

    /// Number of known cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is known.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Remove every known cell.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Smallest rectangle covering every known cell.
    pub fn bounds(&self) -> Option<BoundingBox> {
        let mut keys = self.cells.keys();
        let mut bounds = BoundingBox::point(*keys.next()?);
        for c in keys {
            bounds.include(*c);
        }
        Some(bounds)
    }

    /// Render the bounding box of known cells. Does not modify the grid.
    pub fn snapshot(&self) -> Snapshot {
        let Some(bounds) = self.bounds() else {
            return Snapshot::new(None, Vec::new());
        };

        let rows: Vec<String> = (bounds.min.y..=bounds.max.y)
            .map(|y| {
                (bounds.min.x..=bounds.max.x)
                    .map(|x| self.get(Coord::new(x, y)).unwrap_or(BLANK))
                    .collect::<String>()
            })
            .collect();

        Snapshot::new(Some(bounds), rows)
    }

    /// Like [`snapshot`](Self::snapshot), but `None` when the bounding box
    /// covers more than `max_area` cells.
    pub fn snapshot_within(&self, max_area: u64) -> Option<Snapshot> {
        match self.bounds() {
            Some(bounds) if bounds.area() > max_area => None,
            _ => Some(self.snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_carry_forward() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[
            CellDelta::at(0, 0, 'A'),
            CellDelta::next('B'),
            CellDelta::next('C'),
        ]);

        assert!(report.is_clean());
        assert_eq!(report.written, 3);
        assert_eq!(grid.get(Coord::new(0, 0)), Some('A'));
        assert_eq!(grid.get(Coord::new(1, 0)), Some('B'));
        assert_eq!(grid.get(Coord::new(2, 0)), Some('C'));
    }

    #[test]
    fn test_omitted_glyph_advances_without_writing() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[
            CellDelta::at(5, 5, 'X'),
            CellDelta::skip(),
            CellDelta::next('Y'),
        ]);

        assert_eq!(report.written, 2);
        assert_eq!(report.advanced, 1);
        assert_eq!(grid.get(Coord::new(5, 5)), Some('X'));
        assert_eq!(grid.get(Coord::new(6, 5)), None);
        assert_eq!(grid.get(Coord::new(7, 5)), Some('Y'));
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(1, 1, '#')]);
        let before = grid.snapshot();

        let report = grid.apply_deltas(&[]);

        assert_eq!(report, DeltaReport::default());
        assert_eq!(grid.snapshot(), before);
    }

    #[test]
    fn test_negative_and_far_coordinates() {
        let mut grid = GridState::new();

        grid.apply_deltas(&[
            CellDelta::at(-1_000_000, 3, 'a'),
            CellDelta::at(5_000_000_000, -7, 'b'),
        ]);

        assert_eq!(grid.get(Coord::new(-1_000_000, 3)), Some('a'));
        assert_eq!(grid.get(Coord::new(5_000_000_000, -7)), Some('b'));
        let bounds = grid.bounds().unwrap();
        assert_eq!(bounds.min, Coord::new(-1_000_000, -7));
        assert_eq!(bounds.max, Coord::new(5_000_000_000, 3));
    }

    #[test]
    fn test_later_write_overwrites() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(0, 0, '.')]);
        grid.apply_deltas(&[CellDelta::at(0, 0, '@')]);
        assert_eq!(grid.get(Coord::new(0, 0)), Some('@'));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_cursor_resets_between_batches() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(0, 0, 'A')]);

        let report = grid.apply_deltas(&[CellDelta::next('B')]);

        assert_eq!(report.skipped, vec![(0, DeltaFault::NoAnchor)]);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_y_without_x_is_skipped() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[
            CellDelta::at(0, 0, 'A'),
            CellDelta {
                y: Some(4),
                g: Some("Z".into()),
                ..CellDelta::default()
            },
            CellDelta::next('B'),
            CellDelta::at(3, 3, 'C'),
            CellDelta::next('D'),
        ]);

        assert_eq!(
            report.skipped,
            vec![(1, DeltaFault::MissingX), (2, DeltaFault::NoAnchor)]
        );
        assert_eq!(report.written, 3);
        assert_eq!(grid.get(Coord::new(3, 3)), Some('C'));
        assert_eq!(grid.get(Coord::new(4, 3)), Some('D'));
        assert_eq!(grid.len(), 3);
    }

    #[test]
    fn test_x_without_y_is_skipped() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[CellDelta {
            x: Some(2),
            g: Some("Z".into()),
            ..CellDelta::default()
        }]);

        assert_eq!(report.skipped, vec![(0, DeltaFault::MissingY)]);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_bad_glyph_keeps_position() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[
            CellDelta::at(0, 0, 'A'),
            CellDelta {
                g: Some("too long".into()),
                ..CellDelta::default()
            },
            CellDelta::next('C'),
        ]);

        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0], (1, DeltaFault::BadGlyph(_))));
        assert_eq!(grid.get(Coord::new(1, 0)), None);
        assert_eq!(grid.get(Coord::new(2, 0)), Some('C'));
    }

    #[test]
    fn test_overflow_is_skipped() {
        let mut grid = GridState::new();

        let report = grid.apply_deltas(&[CellDelta::at(i64::MAX, 0, 'A'), CellDelta::next('B')]);

        assert_eq!(report.skipped, vec![(1, DeltaFault::CoordinateOverflow)]);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_origin_offset() {
        let mut grid = GridState::new().with_origin(Coord::new(100, -50));

        grid.apply_deltas(&[CellDelta::at(1, 2, '#'), CellDelta::next('.')]);

        assert_eq!(grid.get(Coord::new(101, -48)), Some('#'));
        assert_eq!(grid.get(Coord::new(102, -48)), Some('.'));
    }

    #[test]
    fn test_row_wrap() {
        let mut grid = GridState::new().with_row_wrap(RowWrap::new(0, 3));

        grid.apply_deltas(&[
            CellDelta::at(1, 0, 'a'),
            CellDelta::next('b'),
            CellDelta::next('c'),
            CellDelta::next('d'),
        ]);

        assert_eq!(grid.snapshot().render(), " ab\ncd ");
    }

    #[test]
    fn test_unbounded_rows_do_not_wrap() {
        let mut grid = GridState::new();
        let mut deltas = vec![CellDelta::at(0, 0, '0')];
        deltas.extend((0..300).map(|_| CellDelta::next('.')));

        grid.apply_deltas(&deltas);

        assert_eq!(grid.get(Coord::new(300, 0)), Some('.'));
        assert_eq!(grid.bounds().unwrap().height(), 1);
    }

    #[test]
    fn test_apply_map_update_clear_then_apply() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(9, 9, 'o')]);

        let update: MapUpdate = serde_json::from_value(json!({
            "msg": "map",
            "clear": true,
            "cells": [{"x": 0, "y": 0, "g": "@"}, {"x": "bad"}, {"g": "#"}]
        }))
        .unwrap();
        let report = grid.apply_map_update(update);

        assert!(report.cleared);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0], (1, DeltaFault::Unreadable(_))));
        assert_eq!(report.skipped[1], (2, DeltaFault::NoAnchor));
        assert_eq!(grid.get(Coord::new(9, 9)), None);
        assert_eq!(grid.len(), 1);

        let errors: Vec<_> = report.errors().collect();
        assert!(matches!(errors[1], TilefeedError::InvalidDelta { index: 2, .. }));
    }

    #[test]
    fn test_snapshot_render() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[
            CellDelta::at(-1, -1, '#'),
            CellDelta::next('#'),
            CellDelta::next('#'),
            CellDelta::at(-1, 0, '#'),
            CellDelta::skip(),
            CellDelta::next('@'),
        ]);

        let snapshot = grid.snapshot();

        assert_eq!(snapshot.bounds().unwrap().to_string(), "-1,-1 - 1,0");
        assert_eq!(snapshot.rows(), &["###".to_string(), "# @".to_string()]);
        assert_eq!(snapshot.to_string(), "-1,-1 - 1,0\n###\n# @\n");
    }

    #[test]
    fn test_snapshot_blank_rows_keep_width() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(0, 0, 'a'), CellDelta::at(3, 2, 'b')]);

        let snapshot = grid.snapshot();

        assert_eq!(snapshot.rows(), &["a   ", "    ", "   b"]);
        assert!(snapshot.rows().iter().all(|r| r.chars().count() == 4));
    }

    #[test]
    fn test_snapshot_idempotent() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(2, 2, 'x'), CellDelta::next('y')]);

        let first = grid.snapshot();
        let second = grid.snapshot();

        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_snapshot_within_skips_sparse_extremes() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(0, 0, 'a'), CellDelta::at(0, 1_000_000_000, 'b')]);

        assert!(grid.snapshot_within(64 * 1024).is_none());
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.bounds().unwrap().height(), 1_000_000_001);

        let mut small = GridState::new();
        small.apply_deltas(&[CellDelta::at(0, 0, 'a'), CellDelta::at(1, 1, 'b')]);
        assert_eq!(small.snapshot_within(4), Some(small.snapshot()));
        assert!(small.snapshot_within(3).is_none());

        assert!(GridState::new().snapshot_within(0).unwrap().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut grid = GridState::new();
        grid.apply_deltas(&[CellDelta::at(0, 0, '#')]);

        grid.clear();

        assert!(grid.is_empty());
        assert!(grid.snapshot().is_empty());
        assert_eq!(grid.snapshot().to_string(), "Map is empty\n");
    }
}

//! Route table for dispatching records by their `msg` discriminant.
//!
//! Each discriminant maps to one [`Route`] variant. Lookup is explicit;
//! anything not registered falls through to [`Route::PassThrough`] and is
//! handed back to the caller untouched.
//!
//! # Example
//!
//! ```
//! use tilefeed_client::grid::GridState;
//! use tilefeed_client::handler::{Dispatched, Route, RouteTable};
//! use tilefeed_client::protocol::MessageValue;
//!
//! let mut routes = RouteTable::new();
//! routes.register("heartbeat", Route::Keepalive);
//!
//! let mut grid = GridState::new();
//! let value = MessageValue::parse(br#"[{"msg":"heartbeat"},{"msg":"chat"}]"#).unwrap();
//! for record in value {
//!     match routes.dispatch(record, &mut grid).unwrap() {
//!         Dispatched::Keepalive(_) => println!("reply"),
//!         Dispatched::PassThrough(r) => println!("other: {}", r.kind()),
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::HashMap;

use crate::error::TilefeedError;
use crate::grid::{DeltaReport, GridState, MapUpdate};
use crate::protocol::MessageRecord;

/// Discriminant of grid delta batches.
pub const MAP_KIND: &str = "map";

/// Discriminant of server keepalives.
pub const PING_KIND: &str = "ping";

/// Where a record goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cell deltas for the grid reconstructor.
    MapDelta,
    /// Keepalive that needs an outbound reply.
    Keepalive,
    /// Not interpreted here; handed to external handlers.
    PassThrough,
}

/// Result of dispatching one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Deltas were applied to the grid.
    Map(DeltaReport),
    /// A keepalive arrived.
    Keepalive(MessageRecord),
    /// Any other record.
    PassThrough(MessageRecord),
}

/// Table mapping discriminants to routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    /// Create a table with the default routes: `map` and `ping`.
    pub fn new() -> Self {
        let mut table = Self::empty();
        table.register(MAP_KIND, Route::MapDelta);
        table.register(PING_KIND, Route::Keepalive);
        table
    }

    /// Create a table where everything passes through.
    pub fn empty() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Route `kind` to `route`, replacing any earlier entry.
    pub fn register(&mut self, kind: &str, route: Route) {
        self.routes.insert(kind.to_string(), route);
    }

    /// Remove the entry for `kind`, so it passes through.
    pub fn unregister(&mut self, kind: &str) -> Option<Route> {
        self.routes.remove(kind)
    }

    /// Route for `kind`, if explicitly registered.
    pub fn get_route(&self, kind: &str) -> Option<Route> {
        self.routes.get(kind).copied()
    }

    /// Route for `kind`, defaulting to pass-through.
    pub fn resolve(&self, kind: &str) -> Route {
        self.get_route(kind).unwrap_or(Route::PassThrough)
    }

    /// Dispatch a record, applying map deltas to `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`TilefeedError::MalformedRecord`] when a map record's payload
    /// does not decode (e.g. `cells` is not an array). The grid is untouched
    /// in that case.
    pub fn dispatch(
        &self,
        record: MessageRecord,
        grid: &mut GridState,
    ) -> Result<Dispatched, TilefeedError> {
        match self.resolve(record.kind()) {
            Route::MapDelta => {
                let update: MapUpdate =
                    record
                        .decode()
                        .map_err(|e| TilefeedError::MalformedRecord {
                            kind: record.kind().to_string(),
                            reason: e.to_string(),
                        })?;
                Ok(Dispatched::Map(grid.apply_map_update(update)))
            }
            Route::Keepalive => Ok(Dispatched::Keepalive(record)),
            Route::PassThrough => Ok(Dispatched::PassThrough(record)),
        }
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

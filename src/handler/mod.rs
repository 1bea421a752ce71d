//! Handler module - record routing and dispatch.
//!
//! Provides:
//! - [`RouteTable`] - maps `msg` discriminants to [`Route`]s
//! - [`Dispatched`] - what happened to a dispatched record

mod registry;

pub use registry::{Dispatched, Route, RouteTable, MAP_KIND, PING_KIND};

//! # tilefeed-client
//!
//! Client-side decoder for a tile game's compressed push feed.
//!
//! The server sends permessage-deflate frames with context takeover. Each
//! frame inflates to a slice of one continuous stream of concatenated JSON
//! values, and `map` records in that stream carry delta-encoded cell updates
//! for an unbounded sparse grid.
//!
//! ## Architecture
//!
//! - **Inflate** ([`protocol::FrameInflater`]): one raw-deflate context per connection
//! - **Extract** ([`protocol::ValueBuffer`]): complete values cut from the byte stream
//! - **Dispatch** ([`handler::RouteTable`]): records routed by their `msg` tag
//! - **Reconstruct** ([`grid::GridState`]): cell deltas applied to the grid
//!
//! [`Connection`] runs all four synchronously; [`Client`] drives a connection
//! from a tokio channel and answers keepalives.
//!
//! ## Example
//!
//! ```
//! use tilefeed_client::Connection;
//!
//! let conn = Connection::builder().origin(0, 0).build();
//! // for frame in transport { conn.feed(&frame)?; }
//! assert_eq!(conn.snapshot().to_string(), "Map is empty\n");
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod grid;
pub mod handler;
pub mod outbound;
pub mod protocol;

mod client;

pub use client::{Client, ClientBuilder, DEFAULT_PONG_DELAY, DEFAULT_PONG_PAYLOAD};
pub use connection::{Connection, ConnectionBuilder, Event};
pub use error::{DeltaFault, Result, TilefeedError};

//! Client builder and runtime loop.
//!
//! The [`ClientBuilder`] configures a [`Connection`] plus the keepalive
//! reply. [`Client::run`] drives it from an inbound frame channel:
//! 1. Receive a compressed frame
//! 2. Feed it through the connection (inflate, extract, dispatch)
//! 3. Schedule a delayed pong for each keepalive
//! 4. Forward pass-through records to the caller
//!
//! When the frame channel closes, `run` returns the final grid.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use tilefeed_client::outbound::outbound_channel;
//! use tilefeed_client::Client;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (frame_tx, frame_rx) = mpsc::channel::<Bytes>(64);
//!     let (record_tx, mut record_rx) = mpsc::channel(64);
//!     let (outbound, mut replies) = outbound_channel(16);
//!
//!     tokio::spawn(async move {
//!         while let Some(record) = record_rx.recv().await {
//!             println!("record: {}", record);
//!         }
//!     });
//!     tokio::spawn(async move {
//!         while let Some(reply) = replies.recv().await {
//!             println!("send: {}", reply.as_str());
//!         }
//!     });
//!
//!     // The transport pushes frames into `frame_tx`...
//!     drop(frame_tx);
//!
//!     let grid = Client::builder().build().run(frame_rx, record_tx, outbound).await?;
//!     println!("{}", grid.snapshot());
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::connection::{Connection, ConnectionBuilder, Event};
use crate::error::Result;
use crate::grid::GridState;
use crate::outbound::{OutboundHandle, OutboundMessage};
use crate::protocol::MessageRecord;

/// Default delay before answering a keepalive.
pub const DEFAULT_PONG_DELAY: Duration = Duration::from_secs(5);

/// Default keepalive reply.
pub const DEFAULT_PONG_PAYLOAD: &str = r#"{"msg":"pong"}"#;

/// Builder for configuring and creating a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    connection: ConnectionBuilder,
    pong_delay: Duration,
    pong_payload: String,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            connection: ConnectionBuilder::new(),
            pong_delay: DEFAULT_PONG_DELAY,
            pong_payload: DEFAULT_PONG_PAYLOAD.to_string(),
        }
    }

    /// Set how long to wait before answering a keepalive.
    ///
    /// Default: 5 seconds
    pub fn pong_delay(mut self, delay: Duration) -> Self {
        self.pong_delay = delay;
        self
    }

    /// Set the keepalive reply payload.
    ///
    /// Default: `{"msg":"pong"}`
    pub fn pong_payload(mut self, payload: impl Into<String>) -> Self {
        self.pong_payload = payload.into();
        self
    }

    /// Use a configured connection.
    pub fn connection(mut self, connection: ConnectionBuilder) -> Self {
        self.connection = connection;
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        Client {
            connection: self.connection.build(),
            pong_delay: self.pong_delay,
            pong_payload: self.pong_payload,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Async driver over one [`Connection`].
#[derive(Debug)]
pub struct Client {
    connection: Connection,
    pong_delay: Duration,
    pong_payload: String,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The underlying connection.
    #[inline]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Read frames until the source closes, returning the final grid.
    ///
    /// Pass-through records go to `records`; if that receiver is gone they
    /// are dropped. Keepalives are answered through `outbound` after the
    /// configured delay. A fatal error ends the loop and is returned.
    pub async fn run(
        mut self,
        mut frames: mpsc::Receiver<Bytes>,
        records: mpsc::Sender<MessageRecord>,
        outbound: OutboundHandle,
    ) -> Result<GridState> {
        while let Some(frame) = frames.recv().await {
            let events = match self.connection.feed(&frame) {
                Ok(events) => events,
                Err(e) => {
                    error!("Read loop error: {}", e);
                    return Err(e);
                }
            };

            for event in events {
                self.handle_event(event, &records, &outbound).await;
            }
        }

        debug!("Frame source closed");
        self.connection.close();
        Ok(self.connection.into_grid())
    }

    async fn handle_event(
        &self,
        event: Event,
        records: &mpsc::Sender<MessageRecord>,
        outbound: &OutboundHandle,
    ) {
        match event {
            Event::Keepalive(_) => {
                trace!(delay = ?self.pong_delay, "Scheduling pong");
                // Detached; failures are logged by the task
                let _ = outbound.send_after(
                    self.pong_delay,
                    OutboundMessage::text(self.pong_payload.clone()),
                );
            }
            Event::Record(record) => {
                let kind = record.kind().to_string();
                if records.send(record).await.is_err() {
                    debug!("Record receiver dropped, discarding {:?}", kind);
                }
            }
            // Logged by the connection
            Event::MapUpdated(_) | Event::Malformed(_) => {}
        }
    }
}

//! Outbound sender boundary.
//!
//! Replies (keepalive pongs, mostly) are queued as ready-made text payloads on
//! an mpsc channel. Whoever owns the transport drains the receiver; for
//! line-oriented sinks [`spawn_line_writer`] does that in a dedicated task.
//!
//! ```text
//! Client ────┐
//! pong timer ┼─► mpsc::Sender<OutboundMessage> ─► transport / line writer
//! caller ────┘
//! ```

use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::JsonCodec;
use crate::error::{Result, TilefeedError};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum messages written per flush by the line writer.
const MAX_BATCH_SIZE: usize = 32;

/// A text payload ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: String,
}

impl OutboundMessage {
    /// Wrap an already-encoded payload.
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Encode a value as a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::text(JsonCodec::encode(value)?))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.payload
    }

    #[inline]
    pub fn into_string(self) -> String {
        self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Handle for queueing outbound payloads.
///
/// Cheaply cloneable; the delayed pong tasks each hold one.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl OutboundHandle {
    /// Queue a payload, waiting for room if the channel is full.
    pub async fn send(&self, message: OutboundMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TilefeedError::ConnectionClosed)
    }

    /// Queue a payload without waiting.
    ///
    /// Returns `Err(OutboundFull)` immediately if at capacity.
    pub fn try_send(&self, message: OutboundMessage) -> Result<()> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TilefeedError::OutboundFull,
            mpsc::error::TrySendError::Closed(_) => TilefeedError::ConnectionClosed,
        })
    }

    /// Queue a payload after `delay` on a spawned task.
    ///
    /// A zero delay still goes through the task, so ordering relative to the
    /// caller's later sends is not guaranteed. Failures are logged as well as
    /// returned, since callers usually detach the task.
    pub fn send_after(&self, delay: Duration, message: OutboundMessage) -> JoinHandle<Result<()>> {
        let handle = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            trace!(len = message.len(), "Sending delayed outbound message");
            let result = handle.send(message).await;
            if let Err(e) = &result {
                warn!("Delayed outbound send failed: {}", e);
            }
            result
        })
    }

    /// Whether the receiving side has gone away.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create an outbound channel.
pub fn outbound_channel(capacity: usize) -> (OutboundHandle, mpsc::Receiver<OutboundMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutboundHandle { tx }, rx)
}

/// Spawn a task that writes each payload as one line to `writer`.
///
/// The task ends cleanly once every [`OutboundHandle`] is dropped.
pub fn spawn_line_writer<W>(
    rx: mpsc::Receiver<OutboundMessage>,
    writer: W,
) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(line_writer_loop(rx, writer))
}

async fn line_writer_loop<W>(mut rx: mpsc::Receiver<OutboundMessage>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(m) => m,
            None => return Ok(()),
        };

        // Collect whatever else is ready, then flush once
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(m) => batch.push(m),
                Err(_) => break,
            }
        }

        for message in &batch {
            writer.write_all(message.as_str().as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        debug!(count = batch.len(), "Wrote outbound batch");
    }
}

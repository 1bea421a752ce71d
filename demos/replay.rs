//! Replay - feed a canned session through the client.
//!
//! This example demonstrates:
//! - Producing permessage-deflate frames with a shared compression context
//! - Driving a [`Client`] from a frame channel
//! - Answering keepalives through a line writer on stdout
//! - Dumping the reconstructed map
//!
//! # Running
//!
//! ```text
//! RUST_LOG=tilefeed_client=debug cargo run --example replay
//! ```

use std::time::Duration;

use bytes::Bytes;
use flate2::{Compress, Compression, FlushCompress};
use tilefeed_client::outbound::{outbound_channel, spawn_line_writer};
use tilefeed_client::{Client, Connection};
use tokio::sync::mpsc;

/// What a server might push during the first seconds of a session.
const SESSION: &[&str] = &[
    r##"{"msgs":[{"msg":"map","clear":true,"cells":[{"x":0,"y":0,"g":"#"},{"g":"#"},{"g":"#"},{"g":"#"},{"g":"#"}]}]}"##,
    r##"[{"msg":"map","cells":[{"x":0,"y":1,"g":"#"},{"g":"."},{"g":"@"},{"g":"."},{"g":"#"}]},{"msg":"ping"}]"##,
    r##"{"msg":"chat","text":"Welcome to the dungeon"}"##,
    r##"{"msg":"map","cells":[{"x":0,"y":2,"g":"#"},{"g":"#"},{"g":"+"},{"g":"#"},{"g":"#"}]}"##,
    r##"{"msg":"map","cells":[{"x":2,"y":1,"g":"."},{"x":2,"y":2,"g":"@"}]}{"msg":"ping"}"##,
];

fn compress_session() -> Vec<Bytes> {
    let mut deflate = Compress::new(Compression::default(), false);
    SESSION
        .iter()
        .filter_map(|message| {
            let mut out = Vec::with_capacity(message.len() + 64);
            deflate
                .compress_vec(message.as_bytes(), &mut out, FlushCompress::Sync)
                .ok()?;
            // The transport strips the flush marker
            out.truncate(out.len().saturating_sub(4));
            Some(Bytes::from(out))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let (frame_tx, frame_rx) = mpsc::channel(16);
    let (record_tx, mut record_rx) = mpsc::channel(16);
    let (outbound, replies) = outbound_channel(16);

    let writer = spawn_line_writer(replies, tokio::io::stdout());

    let records = tokio::spawn(async move {
        while let Some(record) = record_rx.recv().await {
            println!("<- {}", record);
        }
    });

    tokio::spawn(async move {
        for frame in compress_session() {
            if frame_tx.send(frame).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let client = Client::builder()
        .pong_delay(Duration::from_millis(200))
        .connection(Connection::builder().origin(0, 0))
        .build();

    let grid = client.run(frame_rx, record_tx, outbound).await?;
    records.await?;
    // Ends once the pending pongs are written
    writer.await??;

    grid.snapshot().write_to(&mut std::io::stdout())?;
    Ok(())
}

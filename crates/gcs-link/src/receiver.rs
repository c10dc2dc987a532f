//! Inbound receive loop.
//!
//! Single consumer of the connection's read side: parses frames and hands
//! COMMAND_ACKs to the resolver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use gcs_core::{FrameDecoder, Message};

use crate::backoff::Backoff;
use crate::connection::Connection;
use crate::resolver::AckResolver;

/// Largest MAVLink v2 frame is 280 bytes; UDP datagrams may batch several.
const RECV_BUFFER_LEN: usize = 4096;
const READ_BACKOFF_BASE_MS: u64 = 100;
const READ_BACKOFF_MAX_SECS: u64 = 5;

/// Read until the link ends or shutdown fires, then close the resolver.
///
/// Only acks sent by `vehicle_system` are resolved; 0 accepts any sender.
pub async fn run_receive_loop(
    connection: Arc<Connection>,
    resolver: Arc<AckResolver>,
    vehicle_system: u8,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut backoff = Backoff::new(
        Duration::from_millis(READ_BACKOFF_BASE_MS),
        Duration::from_secs(READ_BACKOFF_MAX_SECS),
    );
    let source = connection.source();

    loop {
        let read = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Receive loop shutting down");
                break;
            }
            read = connection.read(&mut buf) => read,
        };

        match read {
            Ok(0) => {
                tracing::info!("Vehicle link {} ended", connection.describe());
                break;
            }
            Ok(len) => {
                backoff.succeeded();
                decoder.push(&buf[..len]);
                let rejected = decoder.rejected();
                drain_frames(&mut decoder, &resolver, vehicle_system, source.system_id);
                if decoder.rejected() > rejected {
                    tracing::warn!(
                        "Dropped {} corrupt frame(s) on {}",
                        decoder.rejected() - rejected,
                        connection.describe()
                    );
                }
            }
            Err(err) => {
                if !connection.is_established() {
                    break;
                }
                let delay = backoff.failed();
                tracing::warn!(
                    "Link read failed {} time(s) in a row: {} (backing off {:?})",
                    backoff.failures(),
                    err,
                    delay
                );
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Receive loop shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    resolver.close();
}

fn drain_frames(
    decoder: &mut FrameDecoder,
    resolver: &AckResolver,
    vehicle_system: u8,
    source_system: u8,
) {
    while let Some(frame) = decoder.next_frame() {
        let ack = match frame.message {
            Message::CommandAck(ack) => ack,
            other => {
                tracing::debug!("Ignoring inbound message {}", other.message_id());
                continue;
            }
        };

        // Another vehicle sharing the link
        if vehicle_system != 0 && frame.header.system_id != vehicle_system {
            tracing::debug!(
                "Ignoring ack for command {} from system {}",
                ack.command,
                frame.header.system_id
            );
            continue;
        }
        // Addressed to another ground station
        if let Some(target) = ack.target_system {
            if target != 0 && target != source_system {
                tracing::debug!(
                    "Ignoring ack for command {} addressed to system {}",
                    ack.command,
                    target
                );
                continue;
            }
        }

        tracing::debug!(
            "Ack from {}/{}: command {} {}",
            frame.header.system_id,
            frame.header.component_id,
            ack.command,
            ack.result
        );
        resolver.resolve(ack);
    }
}

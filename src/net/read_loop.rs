//! Background read loop: one task per connection generation.
//!
//! Pulls frames off the transport, decodes them and posts them to the router.
//! The first read or decode failure (EOF included) releases the link, marks
//! the generation offline and ends the task. It never reconnects on its own.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::read_frame;
use super::link::Link;
use super::transport::FrameReader;
use crate::models::ServerMessage;
use crate::state::Connectivity;

/// Why a read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopExit {
    /// The link was released by someone else (shutdown, reconnect).
    Released,
    /// The stream failed or delivered an undecodable frame.
    Failed(String),
}

/// Spawn the read loop for `link` on the current runtime.
pub fn spawn(
    link: Arc<Link>,
    reader: FrameReader,
    connectivity: Connectivity,
) -> JoinHandle<ReadLoopExit> {
    tokio::spawn(async move {
        let generation = link.generation();
        let exit = run(link, reader, connectivity).await;
        match &exit {
            ReadLoopExit::Released => debug!(generation, "Read loop exited after release"),
            ReadLoopExit::Failed(reason) => info!(generation, %reason, "Read loop exited"),
        }
        exit
    })
}

pub async fn run(
    link: Arc<Link>,
    mut reader: FrameReader,
    connectivity: Connectivity,
) -> ReadLoopExit {
    let generation = link.generation();
    let mut released = link.transport.subscribe_released();
    debug!(generation, "Read loop started");

    loop {
        let frame = tokio::select! {
            biased;
            _ = released.wait_for(|released| *released) => {
                debug!(generation, "Read loop stopped: link released");
                return ReadLoopExit::Released;
            }
            frame = read_frame::<ServerMessage, _>(&mut reader) => frame,
        };

        match frame {
            Ok(msg) => {
                let kind = msg.kind();
                let posted = link.router.post(msg);
                debug!(generation, %kind, ?posted, "Received frame");
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(generation, %reason, "Read from server failed");
                link.release();
                connectivity.mark_offline(generation, reason.clone());
                return ReadLoopExit::Failed(reason);
            }
        }
    }
}

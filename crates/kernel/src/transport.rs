//! The communication seam between workers.
//!
//! The engine only ever talks to a [`Transport`]: a non-blocking directed
//! send plus a blocking receive of whatever arrives next.  The in-process
//! implementation is a full channel mesh with one inbox per worker; a
//! network-backed transport can replace it without touching the engine.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::direction::Direction;
use crate::error::MigrationError;
use crate::particle::Particle;
use crate::Rank;

/// A particle batch in flight between two workers.
///
/// Envelopes are keyed by `(step, direction)`: the receiver matches each one
/// against the receive it posted for that direction in that round.  Empty
/// batches are sent like any other so the per-round receive count stays
/// fixed.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    /// Rank of the sending worker.
    pub from: Rank,
    /// The exchange round this envelope belongs to.
    pub step: u64,
    /// The direction the sender classified these particles into.
    pub direction: Direction,
    /// The particles themselves, possibly none.
    pub particles: Vec<Particle>,
}

/// Directed, ordered delivery of envelopes between workers.
///
/// Sends must not block.  `recv` blocks until the next envelope arrives,
/// with no timeout; a hung peer therefore stalls the caller, which is the
/// documented behavior of the drain.
pub trait Transport {
    /// This worker's rank.
    fn rank(&self) -> Rank;

    /// Queue `envelope` for delivery to `to` without blocking.
    fn send(&mut self, to: Rank, envelope: Envelope) -> Result<(), MigrationError>;

    /// Block until the next inbound envelope arrives.
    fn recv(&mut self) -> Result<Envelope, MigrationError>;
}

/// In-process transport: one mpsc inbox per worker, senders to every peer.
///
/// Channels preserve per-sender order, which the exchange protocol relies
/// on when a fast peer runs ahead by a round.
pub struct ChannelMesh {
    rank: Rank,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
}

/// Build a fully connected mesh for `workers` workers.
///
/// Element `i` of the result belongs to rank `i` and is moved into that
/// worker's thread.
pub fn channel_mesh(workers: usize) -> Vec<ChannelMesh> {
    let (senders, inboxes): (Vec<_>, Vec<_>) =
        (0..workers).map(|_| mpsc::channel()).unzip();
    inboxes
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| ChannelMesh { rank, peers: senders.clone(), inbox })
        .collect()
}

impl Transport for ChannelMesh {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn send(&mut self, to: Rank, envelope: Envelope) -> Result<(), MigrationError> {
        self.peers[to]
            .send(envelope)
            .map_err(|_| MigrationError::ChannelClosed { rank: to })
    }

    fn recv(&mut self) -> Result<Envelope, MigrationError> {
        self.inbox
            .recv()
            .map_err(|_| MigrationError::ChannelClosed { rank: self.rank })
    }
}

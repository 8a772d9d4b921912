//! Error taxonomy for grid construction, topology wiring, and exchange rounds.
//!
//! Three families, by the phase that raises them:
//!
//! - [`ConfigurationError`] -- invalid geometry or grid parameters, raised
//!   while validating inputs before any worker runs.
//! - [`TopologyViolation`] -- an inconsistency in the connection graph,
//!   raised at build time.  A violation here means the layout itself is
//!   broken, not any particular round.
//! - [`MigrationError`] -- a failed exchange round.  These carry the step,
//!   direction, and rank context needed to locate the failure; all of them
//!   abort the run.

use thiserror::Error;

use crate::direction::Direction;
use crate::Rank;

/// Invalid domain geometry or grid parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// A grid shape component is zero.
    #[error("grid shape {shape:?} has a zero component on axis {axis}")]
    ZeroShapeComponent {
        /// The offending shape.
        shape: [usize; 3],
        /// Axis of the zero component.
        axis: usize,
    },

    /// A grid position lies outside the grid shape.
    #[error("grid position {position:?} is out of range for shape {shape:?}")]
    PositionOutOfRange {
        /// The offending position.
        position: [usize; 3],
        /// The grid shape it was checked against.
        shape: [usize; 3],
    },

    /// Domain extents are empty or inverted on some axis.
    #[error("domain min {min:?} must be strictly below max {max:?} on every axis")]
    InvalidDomain {
        /// Lower corner.
        min: [f64; 3],
        /// Upper corner.
        max: [f64; 3],
    },

    /// The requested grid needs more workers than the run provides.
    #[error("grid shape {shape:?} needs {needed} workers but only {available} are available")]
    GridExceedsWorkers {
        /// The requested shape.
        shape: [usize; 3],
        /// Cells in the requested grid.
        needed: usize,
        /// Workers available to the run.
        available: usize,
    },

    /// The per-step displacement bound can hop more than one cell.
    #[error(
        "max displacement {max_displacement} exceeds half the sub-volume width \
         {half_width} on axis {axis}"
    )]
    DisplacementBound {
        /// Configured per-axis displacement bound.
        max_displacement: f64,
        /// Half the narrowest sub-volume width on the offending axis.
        half_width: f64,
        /// The offending axis.
        axis: usize,
    },
}

/// An inconsistency in the connection graph, detected at build time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyViolation {
    /// A send has no matching receive on the peer.
    #[error(
        "asymmetric pairing: rank {rank} sends along {direction} to rank {send_to}, \
         but rank {send_to} does not expect rank {rank} on that direction"
    )]
    AsymmetricPair {
        /// The sending rank.
        rank: Rank,
        /// The direction of the unmatched send.
        direction: Direction,
        /// The rank that lacks the matching receive.
        send_to: Rank,
    },
}

/// A failed exchange round.  Every variant is fatal to the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MigrationError {
    /// A particle was classified into a direction with no neighbor.
    #[error(
        "step {step}: particle {particle_id} on rank {rank} left along {direction}, \
         which has no neighbor"
    )]
    NoNeighbor {
        /// The round that failed.
        step: u64,
        /// The rank holding the particle.
        rank: Rank,
        /// The direction with no neighbor.
        direction: Direction,
        /// The escaping particle.
        particle_id: u64,
    },

    /// A particle moved further than one sub-volume width in a single step.
    #[error(
        "step {step}: particle {particle_id} displaced beyond one sub-volume \
         width on axis {axis}"
    )]
    DisplacementTooLarge {
        /// The round that failed.
        step: u64,
        /// The overshooting particle.
        particle_id: u64,
        /// The axis on which it overshot.
        axis: usize,
    },

    /// A channel to or from a peer is closed.
    #[error("channel to or from rank {rank} is closed")]
    ChannelClosed {
        /// The unreachable rank.
        rank: Rank,
    },

    /// An envelope arrived from the wrong peer for its direction.
    #[error(
        "step {step}: expected rank {expected} on direction {direction}, \
         got an envelope from rank {actual}"
    )]
    UnexpectedSender {
        /// The round being drained.
        step: u64,
        /// The direction of the envelope.
        direction: Direction,
        /// The rank the connection expects.
        expected: Rank,
        /// The rank the envelope actually came from.
        actual: Rank,
    },

    /// An envelope arrived on a direction with no receive posted this round.
    #[error(
        "step {step}: rank {from} sent an envelope on direction {direction}, \
         but no receive is posted for it"
    )]
    UnexpectedEnvelope {
        /// The round being drained.
        step: u64,
        /// The direction of the stray envelope.
        direction: Direction,
        /// The peer that sent it.
        from: Rank,
    },
}

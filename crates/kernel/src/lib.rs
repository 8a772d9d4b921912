//! Particle Migration Kernel
//!
//! This crate provides the core engine for a domain-decomposed particle
//! simulation: the global domain is split across a 3D grid of workers, and
//! after each displacement step every particle that left its worker's
//! sub-volume migrates to the neighboring worker that now owns it.
//!
//! # Modules
//! - [`grid`] -- Global domain geometry and per-worker sub-volumes.
//! - [`direction`] -- The 26 migration directions of the Moore neighborhood.
//! - [`topology`] -- Rank layout, connection lists, and per-direction routing.
//! - [`particle`] -- Particle data and the per-worker store.
//! - [`transport`] -- The communication seam and the in-process channel mesh.
//! - [`migration`] -- The per-step exchange protocol.
//! - [`error`] -- The error taxonomy shared by all of the above.

#![warn(missing_docs)]

pub mod direction;
pub mod error;
pub mod grid;
pub mod migration;
pub mod particle;
pub mod topology;
pub mod transport;

/// Worker rank within the process group.
pub type Rank = usize;

pub use direction::Direction;
pub use error::{ConfigurationError, MigrationError, TopologyViolation};
pub use grid::{GlobalDomain, Periodicity, SubVolume};
pub use migration::{ExchangeStats, MigrationEngine};
pub use particle::{Outgoing, Particle, ParticleStore};
pub use topology::{validate_symmetry, Connection, GridLayout, Route, Topology};
pub use transport::{channel_mesh, ChannelMesh, Envelope, Transport};

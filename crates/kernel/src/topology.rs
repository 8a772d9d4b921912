//! Worker ranks, grid layout, and the per-worker neighbor topology.
//!
//! Each grid cell is owned by one worker, identified by its rank.  Ranks are
//! assigned row-major over the grid (x fastest, then y, then z).  From its
//! own position a worker derives one [`Connection`] per direction that has a
//! live peer on either side, plus a dense routing table used to dispatch
//! outgoing particles.

use crate::direction::Direction;
use crate::error::{ConfigurationError, TopologyViolation};
use crate::grid::Periodicity;
use crate::Rank;

/// Row-major assignment of ranks to grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    shape: [usize; 3],
}

impl GridLayout {
    /// Create a layout over a grid of `shape` cells.
    pub fn new(shape: [usize; 3]) -> Result<Self, ConfigurationError> {
        for axis in 0..3 {
            if shape[axis] == 0 {
                return Err(ConfigurationError::ZeroShapeComponent { shape, axis });
            }
        }
        Ok(Self { shape })
    }

    /// The grid shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Total number of grid cells.
    pub fn cell_count(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    /// Rank of the cell at `position` (x fastest, then y, then z).
    pub fn rank_of(&self, position: [usize; 3]) -> Rank {
        debug_assert!((0..3).all(|a| position[a] < self.shape[a]));
        position[0] + self.shape[0] * (position[1] + self.shape[1] * position[2])
    }

    /// Grid position of `rank`, the inverse of [`Self::rank_of`].
    pub fn position_of(&self, rank: Rank) -> [usize; 3] {
        debug_assert!(rank < self.cell_count());
        let x = rank % self.shape[0];
        let y = (rank / self.shape[0]) % self.shape[1];
        let z = rank / (self.shape[0] * self.shape[1]);
        [x, y, z]
    }

    fn check_position(&self, position: [usize; 3]) -> Result<(), ConfigurationError> {
        for axis in 0..3 {
            if position[axis] >= self.shape[axis] {
                return Err(ConfigurationError::PositionOutOfRange {
                    position,
                    shape: self.shape,
                });
            }
        }
        Ok(())
    }

    /// Resolve the cell at `position + offset`, wrapping periodic axes.
    ///
    /// Returns `None` when any non-periodic axis runs off the grid; the whole
    /// offset is then unreachable.
    fn neighbor(
        &self,
        position: [usize; 3],
        offset: [i8; 3],
        periodicity: Periodicity,
    ) -> Option<Rank> {
        let mut target = [0usize; 3];
        for axis in 0..3 {
            let extent = self.shape[axis] as i64;
            let raw = position[axis] as i64 + offset[axis] as i64;
            target[axis] = if (0..extent).contains(&raw) {
                raw as usize
            } else if periodicity[axis] {
                raw.rem_euclid(extent) as usize
            } else {
                return None;
            };
        }
        Some(self.rank_of(target))
    }
}

/// A directed link between this worker and the peers it trades particles
/// with along one direction.
///
/// The two sides are independent: at a non-periodic edge a worker may be
/// able to receive along a direction it cannot send along, and vice versa.
/// A connection exists as long as either side has a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// The direction this connection serves.
    pub direction: Direction,
    /// Rank that outgoing particles along `direction` are sent to.
    pub send_to: Option<Rank>,
    /// Rank whose envelopes tagged with `direction` this worker expects.
    pub recv_from: Option<Rank>,
}

/// Where particles leaving along a direction go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A live connection; the payload indexes into the connection list.
    Remote(usize),
    /// The direction wraps back onto this worker (degenerate periodic axis).
    /// Particles are wrapped and kept locally, with no traffic.
    Myself,
    /// No peer on either side; particle traffic here is a fatal error.
    Absent,
}

/// One worker's complete view of its neighborhood.
///
/// Immutable after construction.  Connections are sorted by direction code,
/// which fixes the merge order of every exchange round.
#[derive(Debug, Clone)]
pub struct Topology {
    rank: Rank,
    position: [usize; 3],
    connections: Vec<Connection>,
    route: [Route; Direction::COUNT],
}

impl Topology {
    /// Build the topology of the worker at `position`.
    pub fn build(
        layout: &GridLayout,
        position: [usize; 3],
        periodicity: Periodicity,
    ) -> Result<Self, ConfigurationError> {
        layout.check_position(position)?;
        Ok(Self::build_validated(layout, position, periodicity))
    }

    fn build_validated(
        layout: &GridLayout,
        position: [usize; 3],
        periodicity: Periodicity,
    ) -> Self {
        let rank = layout.rank_of(position);
        let mut connections = Vec::new();
        let mut route = [Route::Absent; Direction::COUNT];

        // Direction::ALL is in canonical order, so the connection list comes
        // out sorted by direction code without an explicit sort.
        for direction in Direction::ALL {
            let send_to = layout.neighbor(position, direction.offset(), periodicity);
            let recv_from = layout.neighbor(position, direction.inverse().offset(), periodicity);

            if send_to == Some(rank) {
                // Every non-zero axis of the offset wraps onto itself, so the
                // inverse offset resolves to this worker as well.
                debug_assert_eq!(recv_from, Some(rank));
                route[direction.index()] = Route::Myself;
            } else if send_to.is_some() || recv_from.is_some() {
                route[direction.index()] = Route::Remote(connections.len());
                connections.push(Connection { direction, send_to, recv_from });
            }
        }

        Self { rank, position, connections, route }
    }

    /// This worker's rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// This worker's grid position.
    pub fn position(&self) -> [usize; 3] {
        self.position
    }

    /// All live connections, sorted by direction code.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Where particles leaving along `direction` go.
    pub fn route(&self, direction: Direction) -> Route {
        self.route[direction.index()]
    }

    /// Number of inbound envelopes expected per exchange round.
    pub fn expected_receives(&self) -> usize {
        self.connections.iter().filter(|c| c.recv_from.is_some()).count()
    }
}

/// Check the pairing invariant over the whole grid: every send must have a
/// matching receive posted on the peer, on the same direction.
///
/// Run once at bootstrap; a violation means the layout itself is defective.
pub fn validate_symmetry(
    layout: &GridLayout,
    periodicity: Periodicity,
) -> Result<(), TopologyViolation> {
    let topologies: Vec<Topology> = (0..layout.cell_count())
        .map(|rank| Topology::build_validated(layout, layout.position_of(rank), periodicity))
        .collect();

    for topology in &topologies {
        for connection in topology.connections() {
            let Some(send_to) = connection.send_to else {
                continue;
            };
            let peer = &topologies[send_to];
            let paired = match peer.route(connection.direction) {
                Route::Remote(idx) => {
                    peer.connections()[idx].recv_from == Some(topology.rank())
                }
                Route::Myself | Route::Absent => false,
            };
            if !paired {
                return Err(TopologyViolation::AsymmetricPair {
                    rank: topology.rank(),
                    direction: connection.direction,
                    send_to,
                });
            }
        }
    }
    Ok(())
}

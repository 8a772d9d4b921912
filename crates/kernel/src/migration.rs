//! The per-step particle exchange protocol.
//!
//! One [`MigrationEngine::exchange`] call runs a complete round:
//!
//! 1. Arm one receive slot per connection.
//! 2. Classify and extract leavers, wrap them through periodic global
//!    boundaries, and send one envelope per sendable connection -- always,
//!    empty batches included, so every worker's receive count is fixed and
//!    the round cannot deadlock.
//! 3. Drain the transport until every armed slot is filled.  Envelopes for
//!    a future step are deferred, never dropped; a faster peer may already
//!    be a round ahead.
//! 4. Merge inbound batches into the store in declared-connection order
//!    (direction code order), never arrival order, so two runs with the
//!    same inputs produce the same store ordering.

use std::collections::VecDeque;

use crate::direction::Direction;
use crate::error::MigrationError;
use crate::grid::{GlobalDomain, Periodicity};
use crate::particle::{Particle, ParticleStore};
use crate::topology::{Route, Topology};
use crate::transport::{Envelope, Transport};

/// Particle counts for one exchange round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeStats {
    /// Particles sent to remote peers.
    pub sent: usize,
    /// Particles received from remote peers.
    pub received: usize,
    /// Particles that wrapped onto this worker and never left it.
    pub kept_local: usize,
}

/// Drives exchange rounds for one worker.
pub struct MigrationEngine {
    topology: Topology,
    domain: GlobalDomain,
    periodicity: Periodicity,
    /// Envelopes that arrived for a later round than the one being drained.
    deferred: VecDeque<Envelope>,
}

impl MigrationEngine {
    /// Create an engine for the worker described by `topology`.
    pub fn new(topology: Topology, domain: GlobalDomain, periodicity: Periodicity) -> Self {
        Self { topology, domain, periodicity, deferred: VecDeque::new() }
    }

    /// The worker's neighbor topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Run one exchange round for `step`.
    ///
    /// On success every particle that left the sub-volume this step has
    /// changed owner (or wrapped back onto this worker), and `store` holds
    /// exactly the particles now inside its sub-volume.  On error the round
    /// is torn and the run must abort; all sendable envelopes of the round
    /// have gone out by then, so peers finish draining and fail on their own
    /// next send.
    pub fn exchange<T: Transport>(
        &mut self,
        step: u64,
        store: &mut ParticleStore,
        transport: &mut T,
    ) -> Result<ExchangeStats, MigrationError> {
        let rank = self.topology.rank();
        let mut inbound: Vec<Option<Vec<Particle>>> =
            vec![None; self.topology.connections().len()];
        let mut stats = ExchangeStats::default();

        // Classify and dispatch.  Every direction is visited in canonical
        // order; every sendable connection gets exactly one envelope.  An
        // escape into a missing neighbor is recorded but does not interrupt
        // the send phase: peers still get their full set of envelopes for
        // this round and observe the closed channel on the next one.
        let mut violation: Option<MigrationError> = None;
        let mut outgoing = store.extract_outgoing(step)?;
        for direction in Direction::ALL {
            let mut batch = outgoing.take(direction);
            match self.topology.route(direction) {
                Route::Remote(idx) => {
                    let connection = self.topology.connections()[idx];
                    for particle in &mut batch {
                        particle.position = self.domain.wrap(particle.position, self.periodicity);
                    }
                    match connection.send_to {
                        Some(to) => {
                            stats.sent += batch.len();
                            transport.send(
                                to,
                                Envelope { from: rank, step, direction, particles: batch },
                            )?;
                        }
                        None => {
                            // Receive-only edge: nothing lives out there.
                            if !batch.is_empty() && violation.is_none() {
                                violation = Some(MigrationError::NoNeighbor {
                                    step,
                                    rank,
                                    direction,
                                    particle_id: batch[0].id,
                                });
                            }
                        }
                    }
                }
                Route::Myself => {
                    if !batch.is_empty() {
                        for particle in &mut batch {
                            particle.position =
                                self.domain.wrap(particle.position, self.periodicity);
                        }
                        stats.kept_local += batch.len();
                        store.absorb(batch);
                    }
                }
                Route::Absent => {
                    if !batch.is_empty() && violation.is_none() {
                        violation = Some(MigrationError::NoNeighbor {
                            step,
                            rank,
                            direction,
                            particle_id: batch[0].id,
                        });
                    }
                }
            }
        }
        if let Some(error) = violation {
            return Err(error);
        }

        // Drain.  Deferred envelopes from earlier drains are replayed first;
        // anything for a later step goes back on the queue.
        let expected = self.topology.expected_receives();
        let mut filled = 0;

        let held = std::mem::take(&mut self.deferred);
        for envelope in held {
            if envelope.step == step {
                Self::accept(&self.topology, step, envelope, &mut inbound)?;
                filled += 1;
            } else {
                self.deferred.push_back(envelope);
            }
        }

        while filled < expected {
            let envelope = transport.recv()?;
            if envelope.step > step {
                self.deferred.push_back(envelope);
                continue;
            }
            Self::accept(&self.topology, step, envelope, &mut inbound)?;
            filled += 1;
        }

        // Merge in declared-connection order.  The slot index is the
        // connection index, and connections are sorted by direction code.
        for slot in inbound.iter_mut() {
            if let Some(batch) = slot.take() {
                stats.received += batch.len();
                store.absorb(batch);
            }
        }

        tracing::trace!(
            "rank {} step {}: sent {}, received {}, kept {} local, store {}",
            rank,
            step,
            stats.sent,
            stats.received,
            stats.kept_local,
            store.len()
        );
        Ok(stats)
    }

    /// Match one envelope of the current round against its armed slot.
    fn accept(
        topology: &Topology,
        step: u64,
        envelope: Envelope,
        inbound: &mut [Option<Vec<Particle>>],
    ) -> Result<(), MigrationError> {
        let stray = MigrationError::UnexpectedEnvelope {
            step,
            direction: envelope.direction,
            from: envelope.from,
        };
        if envelope.step != step {
            return Err(stray);
        }
        let Route::Remote(idx) = topology.route(envelope.direction) else {
            return Err(stray);
        };
        let Some(expected_from) = topology.connections()[idx].recv_from else {
            return Err(stray);
        };
        if envelope.from != expected_from {
            return Err(MigrationError::UnexpectedSender {
                step,
                direction: envelope.direction,
                expected: expected_from,
                actual: envelope.from,
            });
        }
        if inbound[idx].is_some() {
            return Err(stray);
        }
        inbound[idx] = Some(envelope.particles);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SubVolume;
    use crate::topology::GridLayout;
    use crate::transport::channel_mesh;

    fn particle(id: u64, position: [f64; 3]) -> Particle {
        Particle { id, position, velocity: [0.0; 3] }
    }

    fn domain() -> GlobalDomain {
        GlobalDomain::new([-50.0; 3], [50.0; 3]).unwrap()
    }

    /// Single periodic cell: every departure wraps back, no traffic at all.
    #[test]
    fn single_cell_round_wraps_and_keeps() {
        let layout = GridLayout::new([1, 1, 1]).unwrap();
        let topology = Topology::build(&layout, [0, 0, 0], [true; 3]).unwrap();
        let volume = SubVolume::compute(&domain(), [1, 1, 1], [0, 0, 0]).unwrap();
        let mut store = ParticleStore::new(volume);
        store.push(particle(1, [49.0, 0.0, 0.0]));
        store.push(particle(2, [0.0, -49.5, 0.0]));

        let mut engine = MigrationEngine::new(topology, domain(), [true; 3]);
        let mut mesh = channel_mesh(1);
        let mut transport = mesh.pop().unwrap();

        // Push both particles over a boundary by hand.
        store.particles_mut()[0].position[0] = 51.0;
        store.particles_mut()[1].position[1] = -50.5;

        let stats = engine.exchange(0, &mut store, &mut transport).unwrap();
        assert_eq!(stats, ExchangeStats { sent: 0, received: 0, kept_local: 2 });
        assert_eq!(store.len(), 2);

        // Re-absorbed in canonical direction order: -y (particle 2) sorts
        // before +x (particle 1).
        let ids: Vec<u64> = store.particles().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(store.particles()[0].position, [0.0, 49.5, 0.0]);
        assert_eq!(store.particles()[1].position, [-49.0, 0.0, 0.0]);
    }

    /// A round in which nothing moved must leave the store untouched.
    #[test]
    fn no_op_round_is_idempotent() {
        let layout = GridLayout::new([1, 1, 1]).unwrap();
        let topology = Topology::build(&layout, [0, 0, 0], [true; 3]).unwrap();
        let volume = SubVolume::compute(&domain(), [1, 1, 1], [0, 0, 0]).unwrap();
        let mut store = ParticleStore::new(volume);
        store.push(particle(1, [10.0, 20.0, 30.0]));
        let before: Vec<Particle> = store.particles().to_vec();

        let mut engine = MigrationEngine::new(topology, domain(), [true; 3]);
        let mut mesh = channel_mesh(1);
        let mut transport = mesh.pop().unwrap();

        let stats = engine.exchange(0, &mut store, &mut transport).unwrap();
        assert_eq!(stats, ExchangeStats::default());
        assert_eq!(store.particles(), &before[..]);
    }

    /// A particle escaping a fully non-periodic box raises, never vanishes.
    #[test]
    fn escape_from_non_periodic_box_is_fatal() {
        let layout = GridLayout::new([1, 1, 1]).unwrap();
        let topology = Topology::build(&layout, [0, 0, 0], [false; 3]).unwrap();
        let volume = SubVolume::compute(&domain(), [1, 1, 1], [0, 0, 0]).unwrap();
        let mut store = ParticleStore::new(volume);
        store.push(particle(5, [49.0, 0.0, 0.0]));
        store.particles_mut()[0].position[0] = 50.5;

        let mut engine = MigrationEngine::new(topology, domain(), [false; 3]);
        let mut mesh = channel_mesh(1);
        let mut transport = mesh.pop().unwrap();

        let err = engine.exchange(3, &mut store, &mut transport).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::NoNeighbor { step: 3, particle_id: 5, .. }
        ));
    }

    /// Drive rank 0 of a periodic pair by hand: pre-feed rank 1's envelopes,
    /// including one from the next round, and check deferral.
    #[test]
    fn future_step_envelopes_are_deferred() {
        let layout = GridLayout::new([2, 1, 1]).unwrap();
        let topology = Topology::build(&layout, [0, 0, 0], [true; 3]).unwrap();
        let volume = SubVolume::compute(&domain(), [2, 1, 1], [0, 0, 0]).unwrap();
        let mut store = ParticleStore::new(volume);

        let remote: Vec<Direction> = topology
            .connections()
            .iter()
            .map(|c| c.direction)
            .collect();

        let mut engine = MigrationEngine::new(topology, domain(), [true; 3]);
        let mut mesh = channel_mesh(2);
        let mut peer = mesh.pop().unwrap();
        let mut transport = mesh.pop().unwrap();

        // Rank 1 races ahead: its step-1 envelope for the first direction
        // lands before any step-0 traffic.
        peer.send(
            0,
            Envelope { from: 1, step: 1, direction: remote[0], particles: vec![] },
        )
        .unwrap();
        for &direction in &remote {
            peer.send(
                0,
                Envelope { from: 1, step: 0, direction, particles: vec![] },
            )
            .unwrap();
        }

        let stats = engine.exchange(0, &mut store, &mut transport).unwrap();
        assert_eq!(stats.received, 0);
        assert_eq!(engine.deferred.len(), 1);

        // Round 1 consumes the deferred envelope plus the rest.
        for &direction in remote.iter().skip(1) {
            peer.send(
                0,
                Envelope { from: 1, step: 1, direction, particles: vec![] },
            )
            .unwrap();
        }
        engine.exchange(1, &mut store, &mut transport).unwrap();
        assert!(engine.deferred.is_empty());
    }

    /// An envelope from the wrong rank on a known direction is a protocol
    /// violation.
    #[test]
    fn wrong_sender_is_rejected() {
        let layout = GridLayout::new([2, 1, 1]).unwrap();
        let topology = Topology::build(&layout, [0, 0, 0], [true; 3]).unwrap();
        let volume = SubVolume::compute(&domain(), [2, 1, 1], [0, 0, 0]).unwrap();
        let mut store = ParticleStore::new(volume);
        let direction = topology.connections()[0].direction;

        let mut engine = MigrationEngine::new(topology, domain(), [true; 3]);
        let mut mesh = channel_mesh(2);
        let mut peer = mesh.pop().unwrap();
        let mut transport = mesh.pop().unwrap();

        peer.send(0, Envelope { from: 7, step: 0, direction, particles: vec![] })
            .unwrap();

        let err = engine.exchange(0, &mut store, &mut transport).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::UnexpectedSender { expected: 1, actual: 7, .. }
        ));
    }
}

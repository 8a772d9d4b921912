//! Particle data and the per-worker particle store.
//!
//! The store owns every particle currently inside one worker's sub-volume.
//! Between exchange rounds the mover displaces particles freely; the store
//! then classifies each particle by raw position and hands the leavers to
//! the migration engine, batched by direction.

use crate::direction::Direction;
use crate::error::MigrationError;
use crate::grid::SubVolume;

/// A single particle.
///
/// `id` and `velocity` are opaque payload to the migration engine; only
/// `position` drives ownership and routing.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Particle {
    /// Globally unique identifier, assigned at generation time.
    pub id: u64,
    /// Position in the global domain.
    pub position: [f64; 3],
    /// Velocity payload, carried along untouched.
    pub velocity: [f64; 3],
}

/// Particles extracted from a store, batched by outgoing direction.
///
/// Within each batch, particles keep the order they had in the store.
#[derive(Debug)]
pub struct Outgoing {
    batches: [Vec<Particle>; Direction::COUNT],
}

impl Outgoing {
    fn new() -> Self {
        Self { batches: std::array::from_fn(|_| Vec::new()) }
    }

    /// The batch for `direction`.
    pub fn batch(&self, direction: Direction) -> &[Particle] {
        &self.batches[direction.index()]
    }

    /// Remove and return the batch for `direction`.
    pub fn take(&mut self, direction: Direction) -> Vec<Particle> {
        std::mem::take(&mut self.batches[direction.index()])
    }

    /// Total number of extracted particles across all directions.
    pub fn total(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}

/// The set of particles owned by one worker.
#[derive(Debug, Clone)]
pub struct ParticleStore {
    volume: SubVolume,
    particles: Vec<Particle>,
}

impl ParticleStore {
    /// Create an empty store over `volume`.
    pub fn new(volume: SubVolume) -> Self {
        Self { volume, particles: Vec::new() }
    }

    /// The sub-volume this store owns.
    pub fn volume(&self) -> &SubVolume {
        &self.volume
    }

    /// Number of particles currently held.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// The particles currently held, in store order.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access for the mover's displacement pass.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Append a particle that already lies inside the sub-volume.
    pub fn push(&mut self, particle: Particle) {
        debug_assert!(self.volume.contains(particle.position));
        self.particles.push(particle);
    }

    /// Half-open membership test against the owned sub-volume.
    pub fn contains(&self, position: [f64; 3]) -> bool {
        self.volume.contains(position)
    }

    /// Classify a raw position relative to the sub-volume.
    ///
    /// Returns `None` for a position still inside, otherwise the direction
    /// of the neighboring cell it moved into: per axis, below the lower
    /// bound is -1 and at or above the upper bound is +1.  The position must
    /// not be wrapped before classification; the wrap would erase the travel
    /// direction.
    pub fn classify(&self, position: [f64; 3]) -> Option<Direction> {
        let mut signs = [0i8; 3];
        for axis in 0..3 {
            if position[axis] < self.volume.min()[axis] {
                signs[axis] = -1;
            } else if position[axis] >= self.volume.max()[axis] {
                signs[axis] = 1;
            }
        }
        Direction::from_signs(signs)
    }

    /// Remove every particle that left the sub-volume, batched by direction.
    ///
    /// Particles that stayed keep their order; so do the particles within
    /// each batch.  A particle that moved further than one sub-volume width
    /// on any axis fails the round with
    /// [`MigrationError::DisplacementTooLarge`].
    pub fn extract_outgoing(&mut self, step: u64) -> Result<Outgoing, MigrationError> {
        let mut outgoing = Outgoing::new();
        let mut kept = Vec::with_capacity(self.particles.len());

        let drained: Vec<Particle> = self.particles.drain(..).collect();
        for particle in drained {
            for axis in 0..3 {
                let width = self.volume.width(axis);
                let below = particle.position[axis] < self.volume.min()[axis] - width;
                let above = particle.position[axis] >= self.volume.max()[axis] + width;
                if below || above {
                    return Err(MigrationError::DisplacementTooLarge {
                        step,
                        particle_id: particle.id,
                        axis,
                    });
                }
            }
            match self.classify(particle.position) {
                Some(direction) => outgoing.batches[direction.index()].push(particle),
                None => kept.push(particle),
            }
        }

        self.particles = kept;
        Ok(outgoing)
    }

    /// Append inbound particles to the store.
    ///
    /// Callers wrap positions through periodic boundaries before absorbing;
    /// every particle must land inside the owned sub-volume.
    pub fn absorb(&mut self, particles: Vec<Particle>) {
        debug_assert!(particles.iter().all(|p| self.volume.contains(p.position)));
        self.particles.extend(particles);
    }
}

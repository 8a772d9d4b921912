//! Per-step particle displacement and initial placement.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kernel::{Particle, Rank, SubVolume};

/// Anything that displaces the particles of one worker for one step.
///
/// The velocity field records the displacement applied in the step, so a
/// snapshot always carries the move that brought each particle to its
/// position.
pub trait Mover {
    /// Displace `particles` in place for `step`.
    fn advance(&mut self, step: u64, particles: &mut [Particle]);
}

/// Uniform random walk, each component drawn from
/// `[-max_displacement, max_displacement)`.
#[derive(Debug)]
pub struct RandomWalk {
    rng: StdRng,
    max_displacement: f64,
}

impl RandomWalk {
    /// Walk driven by an existing generator.
    pub fn new(rng: StdRng, max_displacement: f64) -> Self {
        Self { rng, max_displacement }
    }

    /// Walk seeded for one worker, see [`worker_seed`].
    pub fn seeded(seed: u64, max_displacement: f64) -> Self {
        Self::new(StdRng::seed_from_u64(seed), max_displacement)
    }
}

impl Mover for RandomWalk {
    fn advance(&mut self, _step: u64, particles: &mut [Particle]) {
        for particle in particles {
            for axis in 0..3 {
                let delta = if self.max_displacement > 0.0 {
                    self.rng.gen_range(-self.max_displacement..self.max_displacement)
                } else {
                    0.0
                };
                particle.position[axis] += delta;
                particle.velocity[axis] = delta;
            }
        }
    }
}

/// Derive one worker's seed from the global seed.  Distinct ranks get
/// distinct streams while the whole run stays reproducible.
pub fn worker_seed(global_seed: u64, rank: Rank) -> u64 {
    global_seed.wrapping_add(rank as u64)
}

/// How many particles a worker owns at startup and the id of its first one.
///
/// The total is split as evenly as possible, earlier ranks taking the
/// remainder.  Ids are contiguous per worker and unique across the run.
pub fn particle_share(total: u64, grid_workers: usize, rank: Rank) -> (u64, u64) {
    let workers = grid_workers as u64;
    let rank = rank as u64;
    let base = total / workers;
    let remainder = total % workers;
    let count = base + u64::from(rank < remainder);
    let first_id = rank * base + rank.min(remainder);
    (count, first_id)
}

/// Place `count` particles uniformly inside `volume`, ids starting at
/// `first_id`.
pub fn generate_particles(
    rng: &mut StdRng,
    volume: &SubVolume,
    count: u64,
    first_id: u64,
) -> Vec<Particle> {
    let mut particles = Vec::with_capacity(count as usize);
    for offset in 0..count {
        let mut position = [0.0; 3];
        for axis in 0..3 {
            position[axis] = rng.gen_range(volume.min()[axis]..volume.max()[axis]);
        }
        particles.push(Particle { id: first_id + offset, position, velocity: [0.0; 3] });
    }
    particles
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::GlobalDomain;

    fn volume() -> SubVolume {
        let domain = GlobalDomain::new([-50.0; 3], [50.0; 3]).unwrap();
        SubVolume::compute(&domain, [2, 1, 1], [0, 0, 0]).unwrap()
    }

    #[test]
    fn shares_cover_the_total_with_contiguous_ids() {
        let total = 10;
        let workers = 3;
        let mut next_id = 0;
        let mut sum = 0;
        for rank in 0..workers {
            let (count, first_id) = particle_share(total, workers, rank);
            assert_eq!(first_id, next_id);
            next_id += count;
            sum += count;
        }
        assert_eq!(sum, total);
        // 10 over 3 splits 4, 3, 3.
        assert_eq!(particle_share(total, workers, 0), (4, 0));
        assert_eq!(particle_share(total, workers, 1), (3, 4));
        assert_eq!(particle_share(total, workers, 2), (3, 7));
    }

    #[test]
    fn generated_particles_sit_inside_the_volume() {
        let volume = volume();
        let mut rng = StdRng::seed_from_u64(42);
        let particles = generate_particles(&mut rng, &volume, 200, 1000);
        assert_eq!(particles.len(), 200);
        for (offset, p) in particles.iter().enumerate() {
            assert_eq!(p.id, 1000 + offset as u64);
            assert!(volume.contains(p.position));
            assert_eq!(p.velocity, [0.0; 3]);
        }
    }

    #[test]
    fn walk_is_bounded_and_recorded_in_velocity() {
        let bound = 1.5;
        let mut walk = RandomWalk::seeded(7, bound);
        let mut particles = vec![Particle { id: 1, position: [0.0; 3], velocity: [0.0; 3] }];
        for step in 0..50 {
            let before = particles[0].position;
            walk.advance(step, &mut particles);
            for axis in 0..3 {
                let delta = particles[0].position[axis] - before[axis];
                assert!(delta.abs() < bound + 1e-12);
                assert_eq!(particles[0].velocity[axis], delta);
            }
        }
    }

    #[test]
    fn zero_bound_walk_never_moves() {
        let mut walk = RandomWalk::seeded(7, 0.0);
        let mut particles = vec![Particle { id: 1, position: [3.0, 4.0, 5.0], velocity: [0.0; 3] }];
        walk.advance(0, &mut particles);
        assert_eq!(particles[0].position, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn same_seed_reproduces_the_walk() {
        let run = |seed: u64| {
            let mut walk = RandomWalk::seeded(seed, 1.0);
            let mut particles =
                vec![Particle { id: 1, position: [0.0; 3], velocity: [0.0; 3] }];
            for step in 0..20 {
                walk.advance(step, &mut particles);
            }
            particles[0].position
        };
        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }
}

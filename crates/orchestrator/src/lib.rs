//! Simulation Harness
//!
//! This crate turns a [`SimulationConfig`] into a complete multi-worker run
//! on top of the migration kernel:
//! - Configuration loading and validation
//! - Grid planning, worker roles, and idle-worker accounting
//! - Random-walk displacement and initial particle placement
//! - Per-worker step loop with XYZ snapshot output
//! - Thread-per-worker execution over the in-process channel mesh

#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod controller;
pub mod mover;
pub mod timing;
pub mod writer;

pub use bootstrap::{GridPlan, WorkerRole};
pub use config::{ConfigError, SimulationConfig};
pub use controller::StepController;
pub use mover::{Mover, RandomWalk};

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use kernel::{
    channel_mesh, validate_symmetry, ConfigurationError, MigrationEngine, MigrationError,
    Particle, ParticleStore, Rank, SubVolume, Topology, TopologyViolation,
};

use crate::controller::ControllerTotals;
use crate::mover::{generate_particles, particle_share, worker_seed};
use crate::timing::{StepTimings, Timer};
use crate::writer::XyzWriter;

/// Anything that can end a run before its last step.
#[derive(Debug, Error)]
pub enum RunError {
    /// The configuration cannot describe a runnable grid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// The planned topology is not symmetric.
    #[error(transparent)]
    Topology(#[from] TopologyViolation),
    /// An exchange round failed on some worker.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Snapshot output failed.
    #[error("snapshot output failed: {0}")]
    Snapshot(#[from] std::io::Error),
    /// A worker thread died without reporting.
    #[error("worker {rank} panicked")]
    WorkerPanicked {
        /// Rank of the dead worker.
        rank: Rank,
    },
    /// The run finished with the wrong number of particles.
    #[error("particle count changed: started with {expected}, ended with {actual}")]
    ConservationBroken {
        /// Particles placed at startup.
        expected: u64,
        /// Particles held at the end of the run.
        actual: u64,
    },
}

/// What one worker hands back after its last step.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// The worker's rank.
    pub rank: Rank,
    /// Particles owned when the run ended.  Empty for idle workers.
    pub final_particles: Vec<Particle>,
    /// Wall-clock split across the worker's phases.
    pub timings: StepTimings,
    /// Particles sent to neighbors over the whole run.
    pub sent: u64,
    /// Particles received from neighbors over the whole run.
    pub received: u64,
    /// Wrapped particles kept locally on degenerate periodic axes.
    pub kept_local: u64,
}

impl WorkerReport {
    fn idle(rank: Rank) -> Self {
        Self {
            rank,
            final_particles: Vec::new(),
            timings: StepTimings::default(),
            sent: 0,
            received: 0,
            kept_local: 0,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunSummary {
    /// Steps executed.
    pub steps: u64,
    /// Particles placed and conserved.
    pub total_particles: u64,
    /// Workers holding a grid cell.
    pub grid_workers: usize,
    /// Workers that had nothing to do.
    pub idle_workers: usize,
    /// Wall-clock duration of the whole run in seconds.
    pub wall_seconds: f64,
    /// Per-worker reports, indexed by rank.
    pub reports: Vec<WorkerReport>,
}

/// Run a complete simulation: plan the grid, spawn one thread per grid cell,
/// step them in lockstep through displacement and exchange, and merge the
/// final reports.
///
/// Snapshot files land in `output_dir` when the config names an output and a
/// nonzero write interval.  The run fails if any worker fails; a failed
/// worker takes its peers down through their closed channels within one
/// round.
pub fn run_simulation(
    config: &SimulationConfig,
    output_dir: &Path,
) -> Result<RunSummary, RunError> {
    let started = Instant::now();
    let plan = bootstrap::plan(config)?;
    validate_symmetry(&plan.layout, plan.periodicity)?;

    tracing::info!(
        "starting run: {} steps, {} particles, grid {:?}, {} workers ({} idle)",
        config.max_steps,
        config.total_particles,
        plan.shape,
        config.workers,
        plan.idle_workers()
    );

    let grid_workers = plan.grid_workers();
    let mut handles = Vec::with_capacity(grid_workers);
    for (rank, transport) in channel_mesh(grid_workers).into_iter().enumerate() {
        let WorkerRole::Grid { position } = plan.roles[rank] else {
            unreachable!("mesh covers grid ranks only");
        };
        let layout = plan.layout;
        let domain = plan.domain;
        let periodicity = plan.periodicity;
        let shape = plan.shape;
        let config = config.clone();
        let output_dir: PathBuf = output_dir.to_path_buf();

        handles.push(thread::spawn(move || -> Result<WorkerReport, RunError> {
            let mut transport = transport;
            let mut init_timer = Timer::new();
            init_timer.start();

            let topology = Topology::build(&layout, position, periodicity)?;
            let volume = SubVolume::compute(&domain, shape, position)?;
            let (count, first_id) =
                particle_share(config.total_particles, grid_workers, rank);

            let mut rng = StdRng::seed_from_u64(worker_seed(config.seed, rank));
            let mut store = ParticleStore::new(volume);
            for particle in generate_particles(&mut rng, &volume, count, first_id) {
                store.push(particle);
            }
            tracing::debug!(
                "rank {} at {:?}: {} particles, ids from {}",
                rank,
                position,
                count,
                first_id
            );

            let writer = match (&config.output_name, config.write_interval) {
                (Some(name), interval) if interval > 0 => {
                    Some(XyzWriter::create(&output_dir, name, rank)?)
                }
                _ => None,
            };

            let engine = MigrationEngine::new(topology, domain, periodicity);
            let mover = RandomWalk::new(rng, config.max_displacement);
            let mut controller =
                StepController::new(engine, store, mover, writer, config.write_interval);
            init_timer.stop();

            controller.run(config.max_steps, &mut transport)?;

            let (store, totals) = controller.finish();
            Ok(worker_report(rank, store, init_timer.seconds(), totals))
        }));
    }

    let mut reports = Vec::with_capacity(config.workers);
    for (rank, handle) in handles.into_iter().enumerate() {
        let report = handle
            .join()
            .map_err(|_| RunError::WorkerPanicked { rank })??;
        reports.push(report);
    }
    for rank in grid_workers..config.workers {
        reports.push(WorkerReport::idle(rank));
    }

    let actual: u64 = reports.iter().map(|r| r.final_particles.len() as u64).sum();
    if actual != config.total_particles {
        return Err(RunError::ConservationBroken {
            expected: config.total_particles,
            actual,
        });
    }

    let summary = RunSummary {
        steps: config.max_steps,
        total_particles: config.total_particles,
        grid_workers,
        idle_workers: plan.idle_workers(),
        wall_seconds: started.elapsed().as_secs_f64(),
        reports,
    };
    tracing::info!(
        "run complete: {} steps, {} particles conserved, {:.3}s",
        summary.steps,
        summary.total_particles,
        summary.wall_seconds
    );
    Ok(summary)
}

fn worker_report(
    rank: Rank,
    store: ParticleStore,
    init_seconds: f64,
    totals: ControllerTotals,
) -> WorkerReport {
    WorkerReport {
        rank,
        final_particles: store.particles().to_vec(),
        timings: StepTimings {
            init: init_seconds,
            step: totals.step_seconds,
            comm: totals.comm_seconds,
        },
        sent: totals.sent,
        received: totals.received,
        kept_local: totals.kept_local,
    }
}

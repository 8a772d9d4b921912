//! End-to-end runs of the thread-per-worker harness.

use std::fs;
use std::path::Path;

use orchestrator::{run_simulation, RunError, RunSummary, SimulationConfig};

fn base_config() -> SimulationConfig {
    SimulationConfig {
        max_steps: 20,
        total_particles: 64,
        workers: 4,
        max_displacement: 2.0,
        ..SimulationConfig::default()
    }
}

fn sorted_ids(summary: &RunSummary) -> Vec<u64> {
    let mut ids: Vec<u64> = summary
        .reports
        .iter()
        .flat_map(|r| r.final_particles.iter().map(|p| p.id))
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn particles_are_conserved_across_a_multi_worker_run() {
    let summary = run_simulation(&base_config(), Path::new(".")).unwrap();

    assert_eq!(summary.steps, 20);
    assert_eq!(summary.grid_workers, 4);
    assert_eq!(summary.idle_workers, 0);
    assert_eq!(summary.total_particles, 64);
    assert_eq!(summary.reports.len(), 4);
    assert_eq!(sorted_ids(&summary), (0..64).collect::<Vec<u64>>());
}

#[test]
fn zero_displacement_run_moves_nothing() {
    let config = SimulationConfig { max_displacement: 0.0, ..base_config() };
    let summary = run_simulation(&config, Path::new(".")).unwrap();

    for report in &summary.reports {
        // 64 particles over 4 cells, nobody crosses a boundary.
        assert_eq!(report.final_particles.len(), 16);
        assert_eq!(report.sent, 0);
        assert_eq!(report.received, 0);
        assert_eq!(report.kept_local, 0);
        for particle in &report.final_particles {
            assert_eq!(particle.velocity, [0.0; 3]);
        }
    }
}

#[test]
fn same_seed_reproduces_the_final_state_exactly() {
    let config = base_config();
    let first = run_simulation(&config, Path::new(".")).unwrap();
    let second = run_simulation(&config, Path::new(".")).unwrap();

    for (a, b) in first.reports.iter().zip(&second.reports) {
        assert_eq!(a.final_particles, b.final_particles);
        assert_eq!(a.sent, b.sent);
        assert_eq!(a.received, b.received);
    }

    let reseeded = SimulationConfig { seed: 99, ..config };
    let third = run_simulation(&reseeded, Path::new(".")).unwrap();
    assert_ne!(
        first.reports[0].final_particles,
        third.reports[0].final_particles
    );
}

#[test]
fn surplus_workers_idle_with_empty_reports() {
    let config = SimulationConfig {
        grid_shape: [2, 1, 1],
        workers: 4,
        ..base_config()
    };
    let summary = run_simulation(&config, Path::new(".")).unwrap();

    assert_eq!(summary.grid_workers, 2);
    assert_eq!(summary.idle_workers, 2);
    assert_eq!(summary.reports.len(), 4);
    for report in &summary.reports[2..] {
        assert!(report.final_particles.is_empty());
        assert_eq!(report.sent, 0);
    }
    assert_eq!(sorted_ids(&summary), (0..64).collect::<Vec<u64>>());
}

#[test]
fn snapshots_land_in_the_output_directory_per_worker() {
    let dir = tempfile::tempdir().unwrap();
    let config = SimulationConfig {
        grid_shape: [2, 1, 1],
        workers: 2,
        output_name: Some("run".into()),
        write_interval: 10,
        ..base_config()
    };
    run_simulation(&config, dir.path()).unwrap();

    for rank in 0..2 {
        let contents = fs::read_to_string(dir.path().join(format!("run.{rank}.xyz"))).unwrap();
        let frames: Vec<&str> = contents
            .lines()
            .filter(|line| line.starts_with("step "))
            .collect();
        // 20 steps at interval 10 yield frames after steps 9 and 19.
        assert_eq!(frames, vec!["step 9", "step 19"]);
    }
}

#[test]
fn displacement_wider_than_half_a_cell_is_rejected() {
    let config = SimulationConfig {
        grid_shape: [4, 1, 1],
        workers: 4,
        max_displacement: 20.0,
        ..base_config()
    };
    let err = run_simulation(&config, Path::new(".")).unwrap_err();
    assert!(matches!(err, RunError::Configuration(_)));
}

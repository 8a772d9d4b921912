//! driftbox command line: configure and run one simulation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orchestrator::{run_simulation, RunSummary, SimulationConfig};

/// A particle-moving test program.  Particles random-walk through a periodic
/// box that is split across a grid of workers, migrating between workers as
/// they cross sub-volume boundaries.
#[derive(Parser, Debug)]
#[command(name = "driftbox", version, about)]
struct Args {
    /// JSON config file; flags override its values.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of steps.
    #[arg(short = 'm', long, value_name = "N")]
    max_steps: Option<u64>,

    /// Total number of particles.
    #[arg(short = 'n', long, value_name = "N")]
    total_particles: Option<u64>,

    /// System size, X:Y:Z or one value for all axes.
    #[arg(short = 'S', long, value_name = "X:Y:Z", value_parser = parse_f64_triple)]
    system_size: Option<[f64; 3]>,

    /// System offset, X:Y:Z or one value for all axes.
    #[arg(short = 'O', long, value_name = "X:Y:Z", value_parser = parse_f64_triple)]
    system_offset: Option<[f64; 3]>,

    /// Grid cells per axis, X:Y:Z; zero components are chosen automatically.
    #[arg(short = 'N', long, value_name = "X:Y:Z", value_parser = parse_usize_triple)]
    grid_shape: Option<[usize; 3]>,

    /// Random seed.
    #[arg(short = 's', long, value_name = "N")]
    seed: Option<u64>,

    /// XYZ output file name; frames go to <name>.<rank>.xyz.
    #[arg(short = 'o', long = "output", value_name = "NAME")]
    output_name: Option<String>,

    /// Step interval of XYZ output; zero disables it.
    #[arg(short = 'w', long, value_name = "N")]
    write_interval: Option<u64>,

    /// Number of workers to spawn.
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Bound on the per-axis random-walk displacement per step.
    #[arg(long, value_name = "D")]
    max_displacement: Option<f64>,

    /// Directory snapshot files are written into.
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Print messages verbosely; repeat for more detail.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_f64_triple(s: &str) -> Result<[f64; 3], String> {
    parse_triple(s)
}

fn parse_usize_triple(s: &str) -> Result<[usize; 3], String> {
    parse_triple(s)
}

/// Parse `X:Y:Z`, broadcasting a single value to all three axes.
fn parse_triple<T: FromStr + Copy>(s: &str) -> Result<[T; 3], String> {
    let parse = |part: &str| {
        part.trim()
            .parse::<T>()
            .map_err(|_| format!("invalid component {part:?} in {s:?}"))
    };
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [one] => Ok([parse(one)?; 3]),
        [x, y, z] => Ok([parse(x)?, parse(y)?, parse(z)?]),
        _ => Err(format!("expected X:Y:Z or a single value, got {s:?}")),
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer())
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("driftbox: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let path = path.to_str().ok_or("config path is not valid UTF-8")?;
            SimulationConfig::load(path)?
        }
        None => SimulationConfig::default(),
    };
    apply_overrides(&mut config, args);

    if args.verbose > 0 {
        print_config(&config);
    }
    let summary = run_simulation(&config, &args.output_dir)?;
    print_report(&summary, args.verbose);
    Ok(())
}

fn apply_overrides(config: &mut SimulationConfig, args: &Args) {
    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(total_particles) = args.total_particles {
        config.total_particles = total_particles;
    }
    if let Some(system_size) = args.system_size {
        config.system_size = system_size;
    }
    if let Some(system_offset) = args.system_offset {
        config.system_offset = system_offset;
    }
    if let Some(grid_shape) = args.grid_shape {
        config.grid_shape = grid_shape;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(name) = &args.output_name {
        config.output_name = Some(name.clone());
    }
    if let Some(write_interval) = args.write_interval {
        config.write_interval = write_interval;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_displacement) = args.max_displacement {
        config.max_displacement = max_displacement;
    }
}

fn print_config(config: &SimulationConfig) {
    println!("# max_steps\t{}", config.max_steps);
    println!("# total_particles\t{}", config.total_particles);
    println!(
        "# system_size\t{}:{}:{}",
        config.system_size[0], config.system_size[1], config.system_size[2]
    );
    println!(
        "# system_offset\t{}:{}:{}",
        config.system_offset[0], config.system_offset[1], config.system_offset[2]
    );
    println!(
        "# grid_shape\t{}:{}:{}",
        config.grid_shape[0], config.grid_shape[1], config.grid_shape[2]
    );
    println!(
        "# periodicity\t{}:{}:{}",
        config.periodicity[0], config.periodicity[1], config.periodicity[2]
    );
    println!("# seed\t{}", config.seed);
    println!("# max_displacement\t{}", config.max_displacement);
    println!("# output_name\t{}", config.output_name.as_deref().unwrap_or(""));
    println!("# write_interval\t{}", config.write_interval);
    println!("# workers\t{}", config.workers);
}

fn print_report(summary: &RunSummary, verbosity: u8) {
    println!("# steps\t{}", summary.steps);
    println!("# particles\t{}", summary.total_particles);
    println!("# grid_workers\t{}", summary.grid_workers);
    println!("# idle_workers\t{}", summary.idle_workers);
    println!("# wall_seconds\t{:.6}", summary.wall_seconds);
    if verbosity > 1 {
        println!("# rank\tparticles\tsent\trecv\tkept\tt_init\tt_step\tt_comm");
        for report in &summary.reports {
            println!(
                "# {}\t{}\t{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}",
                report.rank,
                report.final_particles.len(),
                report.sent,
                report.received,
                report.kept_local,
                report.timings.init,
                report.timings.step,
                report.timings.comm
            );
        }
    }
}

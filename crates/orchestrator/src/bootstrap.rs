//! Grid planning: turning a configuration into a concrete worker grid.
//!
//! The config may leave grid axes at zero, in which case the shape is
//! completed from the worker count: fixed axes are kept, and the remaining
//! cell budget is factored across the free axes as evenly as possible.

use kernel::{ConfigurationError, GlobalDomain, GridLayout, Periodicity, SubVolume};

use crate::config::SimulationConfig;

/// What a spawned worker is supposed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    /// Owns the grid cell at `position` and takes part in every exchange.
    Grid {
        /// Cell coordinate within the grid.
        position: [usize; 3],
    },
    /// Has no cell.  Idle workers exist when the worker count exceeds the
    /// cell count and do nothing for the whole run.
    Idle,
}

/// Fully resolved run geometry, shared by every worker.
#[derive(Debug, Clone)]
pub struct GridPlan {
    /// The completed grid shape, no zero components.
    pub shape: [usize; 3],
    /// Rank layout over that shape.
    pub layout: GridLayout,
    /// Per-axis periodic flags.
    pub periodicity: Periodicity,
    /// The global box.
    pub domain: GlobalDomain,
    /// Role of each worker, indexed by rank.
    pub roles: Vec<WorkerRole>,
}

impl GridPlan {
    /// Number of workers holding a grid cell.
    pub fn grid_workers(&self) -> usize {
        self.layout.cell_count()
    }

    /// Number of workers with nothing to do.
    pub fn idle_workers(&self) -> usize {
        self.roles.len() - self.grid_workers()
    }
}

/// Resolve the configuration into a [`GridPlan`].
///
/// Fails when the fixed grid axes already need more cells than there are
/// workers, or when the displacement bound exceeds half the narrowest
/// sub-volume width.
pub fn plan(config: &SimulationConfig) -> Result<GridPlan, ConfigurationError> {
    let domain = config.domain()?;
    let shape = fill_grid_shape(config.grid_shape, config.workers)?;
    let layout = GridLayout::new(shape)?;

    check_displacement(&domain, shape, config.max_displacement)?;

    let mut roles = Vec::with_capacity(config.workers);
    for rank in 0..config.workers {
        if rank < layout.cell_count() {
            roles.push(WorkerRole::Grid { position: layout.position_of(rank) });
        } else {
            roles.push(WorkerRole::Idle);
        }
    }

    let plan = GridPlan { shape, layout, periodicity: config.periodicity, domain, roles };
    tracing::info!(
        "planned grid {:?}: {} cells, {} idle workers",
        plan.shape,
        plan.grid_workers(),
        plan.idle_workers()
    );
    Ok(plan)
}

/// Complete a grid shape against the available worker count.
///
/// Components greater than one are fixed.  If nothing is free the fixed
/// product is the cell count and merely must not exceed `workers`.  Otherwise
/// the largest multiple of the fixed product that fits into `workers` is
/// distributed over the free axes by prime factorization, handing the largest
/// factors to the currently smallest axes.
pub fn fill_grid_shape(
    requested: [usize; 3],
    workers: usize,
) -> Result<[usize; 3], ConfigurationError> {
    let fixed: usize = requested.iter().filter(|&&c| c > 1).product();
    let has_free = requested.iter().any(|&c| c == 0);

    let cells = if has_free {
        if requested.iter().all(|&c| c == 0) {
            workers
        } else {
            fixed * (workers / fixed)
        }
    } else {
        fixed
    };
    if fixed > workers || cells == 0 || cells > workers {
        return Err(ConfigurationError::GridExceedsWorkers {
            shape: requested,
            needed: fixed.max(cells),
            available: workers,
        });
    }

    let mut shape = requested.map(|c| if c > 1 { c } else { 0 });
    if !has_free {
        // All axes were pinned (possibly to 1); nothing to distribute.
        return Ok(requested.map(|c| c.max(1)));
    }

    // Factor the free budget and grow the smallest zero axis each time,
    // largest factors first.
    let mut factors = prime_factors(cells / fixed);
    factors.reverse();
    let mut filled = shape.map(|c| if c == 0 { 1 } else { 0 });
    for factor in factors {
        let axis = (0..3)
            .filter(|&a| shape[a] == 0)
            .min_by_key(|&a| filled[a])
            .expect("a free axis exists");
        filled[axis] *= factor;
    }
    for axis in 0..3 {
        if shape[axis] == 0 {
            shape[axis] = filled[axis];
        }
    }
    Ok(shape)
}

/// Prime factors in ascending order, `1` yielding an empty list.
fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// The per-step displacement bound must not exceed half the narrowest
/// sub-volume width, otherwise a particle could skip over a neighbor cell
/// in a single step.
fn check_displacement(
    domain: &GlobalDomain,
    shape: [usize; 3],
    max_displacement: f64,
) -> Result<(), ConfigurationError> {
    if !(max_displacement >= 0.0) {
        return Err(ConfigurationError::DisplacementBound {
            max_displacement,
            half_width: 0.0,
            axis: 0,
        });
    }
    let volume = SubVolume::compute(domain, shape, [0, 0, 0])?;
    for axis in 0..3 {
        let half_width = volume.width(axis) / 2.0;
        if max_displacement > half_width {
            return Err(ConfigurationError::DisplacementBound {
                max_displacement,
                half_width,
                axis,
            });
        }
    }
    Ok(())
}

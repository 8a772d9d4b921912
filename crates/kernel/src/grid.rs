//! Global domain geometry and its decomposition into per-worker sub-volumes.
//!
//! The grid splits each axis of the global box into equal-width intervals,
//! one per grid cell.  Membership is half-open (`min <= x < max`) so every
//! point of the domain belongs to exactly one cell; the topmost interval on
//! each axis has its upper bound snapped to the global maximum so the union
//! of all sub-volumes tiles the domain exactly despite rounding.

use crate::error::ConfigurationError;

/// Per-axis periodicity flags.
pub type Periodicity = [bool; 3];

/// The immutable global simulation box.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlobalDomain {
    min: [f64; 3],
    max: [f64; 3],
}

impl GlobalDomain {
    /// Create a domain spanning `[min, max)` on each axis.
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Result<Self, ConfigurationError> {
        for axis in 0..3 {
            if !(min[axis] < max[axis]) {
                return Err(ConfigurationError::InvalidDomain { min, max });
            }
        }
        Ok(Self { min, max })
    }

    /// Lower corner.
    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    /// Upper corner.
    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    /// Edge length along `axis`.
    pub fn extent(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Wrap a position back into the domain on every periodic axis.
    ///
    /// A coordinate is assumed to have crossed at most one global boundary,
    /// which the displacement precondition guarantees.  Non-periodic axes are
    /// left untouched.
    pub fn wrap(&self, mut position: [f64; 3], periodicity: Periodicity) -> [f64; 3] {
        for axis in 0..3 {
            if !periodicity[axis] {
                continue;
            }
            if position[axis] < self.min[axis] {
                position[axis] += self.extent(axis);
            } else if position[axis] >= self.max[axis] {
                position[axis] -= self.extent(axis);
            }
        }
        position
    }
}

/// The axis-aligned box owned by one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubVolume {
    min: [f64; 3],
    max: [f64; 3],
}

impl SubVolume {
    /// Compute the sub-volume of the cell at `position` in a grid of `shape`
    /// cells over `domain`.
    ///
    /// Each axis is split into `shape[axis]` equal-width intervals; the cell
    /// at the top of an axis gets the global maximum as its upper bound.
    pub fn compute(
        domain: &GlobalDomain,
        shape: [usize; 3],
        position: [usize; 3],
    ) -> Result<Self, ConfigurationError> {
        for axis in 0..3 {
            if shape[axis] == 0 {
                return Err(ConfigurationError::ZeroShapeComponent { shape, axis });
            }
        }
        for axis in 0..3 {
            if position[axis] >= shape[axis] {
                return Err(ConfigurationError::PositionOutOfRange { position, shape });
            }
        }

        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for axis in 0..3 {
            let width = domain.extent(axis) / shape[axis] as f64;
            min[axis] = domain.min()[axis] + position[axis] as f64 * width;
            max[axis] = if position[axis] + 1 == shape[axis] {
                domain.max()[axis]
            } else {
                min[axis] + width
            };
        }
        Ok(Self { min, max })
    }

    /// Lower corner.
    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    /// Upper corner.
    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    /// Interval width along `axis`.
    pub fn width(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Half-open membership test: `min <= x < max` on every axis.
    pub fn contains(&self, position: [f64; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= position[axis] && position[axis] < self.max[axis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> GlobalDomain {
        GlobalDomain::new([-50.0; 3], [50.0; 3]).unwrap()
    }

    #[test]
    fn rejects_inverted_extents() {
        assert!(GlobalDomain::new([0.0, 0.0, 0.0], [1.0, 0.0, 1.0]).is_err());
        assert!(GlobalDomain::new([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]).is_err());
        assert!(GlobalDomain::new([0.0; 3], [1.0; 3]).is_ok());
    }

    #[test]
    fn single_cell_spans_the_domain() {
        let sub = SubVolume::compute(&domain(), [1, 1, 1], [0, 0, 0]).unwrap();
        assert_eq!(sub.min(), [-50.0; 3]);
        assert_eq!(sub.max(), [50.0; 3]);
    }

    #[test]
    fn top_cell_snaps_to_global_max() {
        // 100 / 3 is not representable exactly; the topmost interval must
        // still end at the global max, not at an accumulated rounding of it.
        let d = domain();
        let sub = SubVolume::compute(&d, [3, 3, 3], [2, 2, 2]).unwrap();
        assert_eq!(sub.max(), d.max());
    }

    #[test]
    fn adjacent_cells_share_a_face() {
        let d = domain();
        let left = SubVolume::compute(&d, [4, 1, 1], [1, 0, 0]).unwrap();
        let right = SubVolume::compute(&d, [4, 1, 1], [2, 0, 0]).unwrap();
        assert_eq!(left.max()[0], right.min()[0]);
    }

    #[test]
    fn tiling_covers_every_point_exactly_once() {
        let d = domain();
        let shape = [2, 3, 4];
        let probes = [
            [-50.0, -50.0, -50.0],
            [0.0, 0.0, 0.0],
            [49.999, 49.999, 49.999],
            [-0.001, 16.6, -12.5],
            // On an interior cell face: owned by the upper cell only.
            [0.0, -50.0 + 100.0 / 3.0, 25.0],
        ];
        for probe in probes {
            let mut owners = 0;
            for x in 0..shape[0] {
                for y in 0..shape[1] {
                    for z in 0..shape[2] {
                        let sub = SubVolume::compute(&d, shape, [x, y, z]).unwrap();
                        if sub.contains(probe) {
                            owners += 1;
                        }
                    }
                }
            }
            assert_eq!(owners, 1, "point {probe:?} must have exactly one owner");
        }
    }

    #[test]
    fn membership_is_half_open() {
        let sub = SubVolume::compute(&domain(), [2, 1, 1], [0, 0, 0]).unwrap();
        assert!(sub.contains([-50.0, 0.0, 0.0]));
        assert!(!sub.contains([sub.max()[0], 0.0, 0.0]));
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let err = SubVolume::compute(&domain(), [2, 2, 2], [2, 0, 0]).unwrap_err();
        assert!(matches!(err, ConfigurationError::PositionOutOfRange { .. }));
    }

    #[test]
    fn wrap_respects_periodicity_flags() {
        let d = domain();
        let wrapped = d.wrap([51.0, -51.0, 0.0], [true, true, true]);
        assert_eq!(wrapped, [-49.0, 49.0, 0.0]);

        let unwrapped = d.wrap([51.0, -51.0, 0.0], [false, false, false]);
        assert_eq!(unwrapped, [51.0, -51.0, 0.0]);

        // The upper bound itself is outside the half-open box.
        assert_eq!(d.wrap([50.0, 0.0, 0.0], [true, false, false])[0], -50.0);
    }
}

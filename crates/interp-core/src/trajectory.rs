//! Trajectory lookup tables built from motion fields.
//!
//! For every destination pixel two trajectories are integrated through the
//! motion field, one backwards towards the past field and one forwards
//! towards the future field. Each integration step moves by `1/substeps` of
//! the motion vector found at the pixel the trajectory has reached, so the
//! paths curve with the flow instead of extrapolating a straight line.
//!
//! ```text
//!   past field                destination                future field
//!       ●──────●──────●──────────── ◎ ────────────●──────●──────●
//!   PAST slot 2   1      0                          FUTURE 2    1    0
//! ```
//!
//! At substep slot `k` the PAST source lies `k + 1` substeps behind and the
//! FUTURE source `substeps − 1 − k` substeps ahead, so both trajectories
//! meet the destination from opposite ends of the nowcast step.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use nowcast_common::GridSpec;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{InterpError, Result};

/// Index of a source pixel, or off-grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct SourceIndex(i32);

impl SourceIndex {
    pub const OFF_GRID: SourceIndex = SourceIndex(-1);

    #[inline]
    pub fn at(index: usize) -> Self {
        Self(index as i32)
    }

    #[inline]
    fn from_option(index: Option<usize>) -> Self {
        index.map_or(Self::OFF_GRID, Self::at)
    }

    /// The pixel index, or `None` when the trajectory left the grid.
    #[inline]
    pub fn get(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }

    #[inline]
    pub fn is_off_grid(self) -> bool {
        self.0 < 0
    }
}

/// Trajectory direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Backwards into the past field.
    Past,
    /// Forwards into the future field.
    Future,
}

/// Displacement over one nowcast step, in pixels.
#[derive(Debug, Clone)]
pub struct MotionField {
    grid: GridSpec,
    dx: Vec<f64>,
    dy: Vec<f64>,
}

impl MotionField {
    /// Create from separate x and y planes.
    pub fn new(grid: GridSpec, dx: Vec<f64>, dy: Vec<f64>) -> Result<Self> {
        if dx.len() != grid.len() {
            return Err(InterpError::shape_mismatch("motion dx plane", grid.len(), dx.len()));
        }
        if dy.len() != grid.len() {
            return Err(InterpError::shape_mismatch("motion dy plane", grid.len(), dy.len()));
        }
        Ok(Self { grid, dx, dy })
    }

    /// Create from a stacked `[2, height, width]` array (dx plane first).
    pub fn from_planes(grid: GridSpec, mut planes: Vec<f64>) -> Result<Self> {
        if planes.len() != 2 * grid.len() {
            return Err(InterpError::shape_mismatch(
                "stacked motion planes",
                2 * grid.len(),
                planes.len(),
            ));
        }
        let dy = planes.split_off(grid.len());
        Self::new(grid, planes, dy)
    }

    /// Uniform motion, mostly for tests and synthetic runs.
    pub fn uniform(grid: GridSpec, dx: f64, dy: f64) -> Self {
        Self {
            grid,
            dx: vec![dx; grid.len()],
            dy: vec![dy; grid.len()],
        }
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Motion vector at a pixel.
    #[inline]
    pub fn vector(&self, index: usize) -> (f64, f64) {
        (self.dx[index], self.dy[index])
    }
}

/// Source-pixel lookup for one motion field.
///
/// Immutable once built; members sharing a motion field share one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryTables {
    grid: GridSpec,
    slots: usize,
    /// Slot-major: `past[slot * len + pixel]`.
    past: Vec<SourceIndex>,
    future: Vec<SourceIndex>,
    one_step: Vec<SourceIndex>,
}

impl TrajectoryTables {
    /// Integrate the trajectories of `field` for `substeps` substeps.
    pub fn build(field: &MotionField, substeps: u32) -> Result<Self> {
        if substeps < 2 {
            return Err(InterpError::invalid_config("substeps must be >= 2"));
        }

        let grid = field.grid;
        let len = grid.len();
        let slots = substeps as usize - 1;
        let scale = 1.0 / substeps as f64;

        // One full step backwards, unscaled, for nodata advection.
        let one_step = (0..len)
            .map(|n| {
                let (x, y) = grid.coords(n);
                let (dx, dy) = field.vector(n);
                SourceIndex::from_option(grid.nearest_index(x as f64 - dx, y as f64 - dy))
            })
            .collect();

        let step_dx: Vec<f64> = field.dx.iter().map(|v| v * scale).collect();
        let step_dy: Vec<f64> = field.dy.iter().map(|v| v * scale).collect();

        let mut past = vec![SourceIndex::OFF_GRID; slots * len];
        let mut future = vec![SourceIndex::OFF_GRID; slots * len];

        for n in 0..len {
            let (x, y) = grid.coords(n);
            let (x, y) = (x as f64, y as f64);

            // Running displacements, starting with the destination's own vector.
            let mut past_d = Some((step_dx[n], step_dy[n]));
            let mut future_d = past_d;

            for step in 0..slots {
                past_d = past_d.and_then(|(dx, dy)| {
                    let src = grid.nearest_index(x - dx, y - dy)?;
                    past[step * len + n] = SourceIndex::at(src);
                    Some((dx + step_dx[src], dy + step_dy[src]))
                });

                let slot = slots - 1 - step;
                future_d = future_d.and_then(|(dx, dy)| {
                    let src = grid.nearest_index(x + dx, y + dy)?;
                    future[slot * len + n] = SourceIndex::at(src);
                    Some((dx + step_dx[src], dy + step_dy[src]))
                });

                if past_d.is_none() && future_d.is_none() {
                    break;
                }
            }
        }

        Ok(Self {
            grid,
            slots,
            past,
            future,
            one_step,
        })
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Number of substep slots (`substeps − 1`).
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Source pixel of `pixel` for substep slot `slot`.
    #[inline]
    pub fn source(&self, direction: Direction, slot: usize, pixel: usize) -> SourceIndex {
        let index = slot * self.grid.len() + pixel;
        match direction {
            Direction::Past => self.past[index],
            Direction::Future => self.future[index],
        }
    }

    /// All sources of one slot.
    pub fn slot(&self, direction: Direction, slot: usize) -> &[SourceIndex] {
        let len = self.grid.len();
        let table = match direction {
            Direction::Past => &self.past,
            Direction::Future => &self.future,
        };
        &table[slot * len..(slot + 1) * len]
    }

    /// Pixel reached by one full step backwards.
    #[inline]
    pub fn one_step(&self, pixel: usize) -> SourceIndex {
        self.one_step[pixel]
    }

    /// Count of off-grid entries over all slots and both directions.
    pub fn off_grid_count(&self) -> usize {
        self.past
            .iter()
            .chain(self.future.iter())
            .filter(|s| s.is_off_grid())
            .count()
    }
}

/// Build the trajectory tables of every member.
///
/// With a single motion field only one build runs and every member gets a
/// handle to the same tables; otherwise one field per member is built, one
/// rayon task per field.
pub fn build_member_tables(
    fields: &[MotionField],
    members: usize,
    substeps: u32,
) -> Result<Vec<Arc<TrajectoryTables>>> {
    if fields.len() != 1 && fields.len() != members {
        return Err(InterpError::MotionFieldCount {
            members,
            actual: fields.len(),
        });
    }

    info!(
        fields = fields.len(),
        members,
        substeps,
        "Building trajectory tables"
    );

    let built: Vec<Arc<TrajectoryTables>> = fields
        .par_iter()
        .enumerate()
        .map(|(index, field)| {
            let tables = TrajectoryTables::build(field, substeps)?;
            debug!(
                field = index,
                off_grid = tables.off_grid_count(),
                "Trajectory tables ready"
            );
            Ok(Arc::new(tables))
        })
        .collect::<Result<_>>()?;

    if built.len() == 1 {
        Ok(vec![Arc::clone(&built[0]); members])
    } else {
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{create_rotation_motion, create_uniform_motion, stack_motion_planes};

    fn grid4() -> GridSpec {
        GridSpec::new(4, 4)
    }

    #[test]
    fn test_zero_motion_is_identity() {
        let grid = grid4();
        let field = MotionField::uniform(grid, 0.0, 0.0);
        let tables = TrajectoryTables::build(&field, 2).unwrap();

        assert_eq!(tables.slots(), 1);
        for n in 0..grid.len() {
            assert_eq!(tables.source(Direction::Past, 0, n).get(), Some(n));
            assert_eq!(tables.source(Direction::Future, 0, n).get(), Some(n));
            assert_eq!(tables.one_step(n).get(), Some(n));
        }
    }

    #[test]
    fn test_uniform_shift_substep_positions() {
        // One pixel per substep to the east with 4 substeps.
        let grid = GridSpec::new(10, 1);
        let field = MotionField::uniform(grid, 4.0, 0.0);
        let tables = TrajectoryTables::build(&field, 4).unwrap();
        let n = grid.flat_index(5, 0);

        // PAST slot k lies k+1 pixels west
        assert_eq!(tables.source(Direction::Past, 0, n).get(), Some(4));
        assert_eq!(tables.source(Direction::Past, 1, n).get(), Some(3));
        assert_eq!(tables.source(Direction::Past, 2, n).get(), Some(2));
        // FUTURE slot k lies (4 - 1 - k) pixels east
        assert_eq!(tables.source(Direction::Future, 0, n).get(), Some(8));
        assert_eq!(tables.source(Direction::Future, 1, n).get(), Some(7));
        assert_eq!(tables.source(Direction::Future, 2, n).get(), Some(6));
        // one whole step back
        assert_eq!(tables.one_step(n).get(), Some(1));
    }

    #[test]
    fn test_off_grid_never_reenters() {
        let grid = GridSpec::new(12, 12);
        let (dx, dy) = create_rotation_motion(grid.width, grid.height, 9.0);
        let field = MotionField::new(grid, dx, dy).unwrap();
        let tables = TrajectoryTables::build(&field, 10).unwrap();
        let slots = tables.slots();

        for n in 0..grid.len() {
            // PAST integrates in slot order, FUTURE in reverse slot order
            let past: Vec<_> = (0..slots)
                .map(|k| tables.source(Direction::Past, k, n))
                .collect();
            let future: Vec<_> = (0..slots)
                .rev()
                .map(|k| tables.source(Direction::Future, k, n))
                .collect();

            for path in [past, future] {
                if let Some(first_off) = path.iter().position(|s| s.is_off_grid()) {
                    assert!(path[first_off..].iter().all(|s| s.is_off_grid()));
                }
                for s in path {
                    if let Some(index) = s.get() {
                        assert!(index < grid.len());
                    }
                }
            }
        }
    }

    #[test]
    fn test_trajectories_leave_grid_at_edge() {
        let grid = GridSpec::new(6, 6);
        let field = MotionField::uniform(grid, 6.0, 0.0);
        let tables = TrajectoryTables::build(&field, 3).unwrap();

        // western column: one substep (2 px) back is already outside
        let n = grid.flat_index(0, 2);
        assert!(tables.source(Direction::Past, 0, n).is_off_grid());
        assert!(tables.source(Direction::Past, 1, n).is_off_grid());
        assert!(tables.one_step(n).is_off_grid());
        // forwards stays inside
        assert_eq!(tables.source(Direction::Future, 1, n).get(), Some(grid.flat_index(2, 2)));
    }

    #[test]
    fn test_trajectory_follows_local_vectors() {
        // Motion only exists in the east half; a trajectory starting there
        // stops moving once it reaches the calm west half.
        let grid = GridSpec::new(8, 1);
        let dx: Vec<f64> = (0..8).map(|x| if x >= 4 { 3.0 } else { 0.0 }).collect();
        let field = MotionField::new(grid, dx, vec![0.0; 8]).unwrap();
        let tables = TrajectoryTables::build(&field, 3).unwrap();

        let n = grid.flat_index(5, 0);
        // first step: 1 px back to x=4 (moving), second: another px to x=3
        assert_eq!(tables.source(Direction::Past, 0, n).get(), Some(4));
        assert_eq!(tables.source(Direction::Past, 1, n).get(), Some(3));

        let calm = grid.flat_index(2, 0);
        assert_eq!(tables.source(Direction::Past, 1, calm).get(), Some(calm));
    }

    #[test]
    fn test_build_is_deterministic() {
        let grid = GridSpec::new(16, 9);
        let (dx, dy) = create_rotation_motion(grid.width, grid.height, 5.0);
        let field = MotionField::new(grid, dx, dy).unwrap();

        let a = TrajectoryTables::build(&field, 10).unwrap();
        let b = TrajectoryTables::build(&field, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_field_aliases_tables() {
        let grid = grid4();
        let (dx, dy) = create_uniform_motion(grid.width, grid.height, 1.0, -1.0);
        let field = MotionField::new(grid, dx, dy).unwrap();

        let tables = build_member_tables(&[field], 3, 5).unwrap();
        assert_eq!(tables.len(), 3);
        assert!(Arc::ptr_eq(&tables[0], &tables[1]));
        assert!(Arc::ptr_eq(&tables[0], &tables[2]));
    }

    #[test]
    fn test_per_member_fields() {
        let grid = grid4();
        let fields = vec![
            MotionField::uniform(grid, 0.0, 0.0),
            MotionField::uniform(grid, 2.0, 0.0),
        ];
        let tables = build_member_tables(&fields, 2, 2).unwrap();
        assert!(!Arc::ptr_eq(&tables[0], &tables[1]));
        assert_eq!(tables[0].source(Direction::Past, 0, 5).get(), Some(5));
        assert_eq!(tables[1].source(Direction::Past, 0, 5).get(), Some(4));
    }

    #[test]
    fn test_motion_field_count_checked() {
        let grid = grid4();
        let fields = vec![MotionField::uniform(grid, 0.0, 0.0); 2];
        assert!(matches!(
            build_member_tables(&fields, 3, 2),
            Err(InterpError::MotionFieldCount { members: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_from_planes_splits_dx_dy() {
        let grid = GridSpec::new(2, 1);
        let field = MotionField::from_planes(grid, stack_motion_planes(&[1.0, 2.0], &[3.0, 4.0])).unwrap();
        assert_eq!(field.vector(0), (1.0, 3.0));
        assert_eq!(field.vector(1), (2.0, 4.0));
        assert!(MotionField::from_planes(grid, vec![0.0; 3]).is_err());
    }
}

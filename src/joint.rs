//! The Joint-Function Builder: max-plus (tropical) convolution of two grids
//! with argmax bookkeeping, as described in §4.2 of the specification.

use crate::dtype::Scalar;
use crate::error::{Error, Result};
use crate::grid::{ravel_multi_index, unravel_index, Grid};
use crate::kernel::{join_point, Staircase};
use crate::stats::Stats;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Tuning knobs accepted by [`build`], mirroring the six independent boolean
/// flags and two numeric knobs of §4.2. Every combination of these fields
/// must produce identical `values`/`arg` output (only [`Stats`] differ) -
/// see the `flag_equivalence` property test below.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Skip candidates dominated by a previously seen candidate.
    pub filter: bool,
    /// Stronger pruning using monotone-gradient dominance.
    pub filter_grad: bool,
    /// Switch to a dense kernel when the feasible window is small.
    pub brute_opt: bool,
    /// Gather candidate-count statistics.
    pub count: bool,
    /// Gather data-structure build-time statistics.
    pub buildtime: bool,
    /// Gather per-query timing statistics.
    pub querytime: bool,
    /// Points are processed in row-major tiles of this size.
    pub chunk_size: usize,
    /// Selects the acceleration structure used to query the left operand
    /// (`0` = direct array access, `>=1` = the [`Staircase`] cache).
    pub method: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            filter: false,
            filter_grad: false,
            brute_opt: false,
            count: false,
            buildtime: false,
            querytime: false,
            chunk_size: 64,
            method: 0,
        }
    }
}

/// The result of a max-plus convolution: a [`Grid`] of values plus, for each
/// output point, the coordinate chosen for the left operand.
#[derive(Clone, Debug)]
pub struct JointGrid<T: Scalar, const D: usize> {
    values: Grid<T, D>,
    arg: Vec<[u32; D]>,
}

impl<T: Scalar, const D: usize> JointGrid<T, D> {
    /// The value grid.
    #[must_use]
    pub const fn values(&self) -> &Grid<T, D> {
        &self.values
    }

    /// The shape of this joint grid (same as `self.values().shape()`).
    #[must_use]
    pub const fn shape(&self) -> &[usize; D] {
        self.values.shape()
    }

    /// Welfare-maximising point, i.e. `self.values().argmax()`.
    #[must_use]
    pub fn argmax(&self) -> [usize; D] {
        self.values.argmax()
    }

    /// Welfare value at the maximum, i.e. `self.values().max()`.
    #[must_use]
    pub fn max(&self) -> T {
        self.values.max()
    }

    /// The left-operand coordinate chosen for `y`.
    #[must_use]
    pub fn arg_at(&self, y: &[usize; D]) -> [usize; D] {
        let flat = ravel_multi_index(y, self.shape());
        let raw = self.arg[flat];
        let mut out = [0usize; D];
        for k in 0..D {
            out[k] = raw[k] as usize;
        }
        out
    }

    /// The right-operand coordinate implied for `y`: `y - arg_at(y)`,
    /// elementwise.
    #[must_use]
    pub fn right_arg_at(&self, y: &[usize; D]) -> [usize; D] {
        let left = self.arg_at(y);
        let mut out = [0usize; D];
        for k in 0..D {
            out[k] = y[k] - left[k];
        }
        out
    }
}

/// Shape a Joint Grid is truncated to: `min(s_a + s_b - 1, m + 1)` per axis,
/// per §4.2; any axis that would be non-positive collapses to `0`.
#[must_use]
pub fn joint_shape<const D: usize>(
    s_a: &[usize; D],
    s_b: &[usize; D],
    bound: &[usize; D],
) -> [usize; D] {
    let mut shape = [0usize; D];
    for k in 0..D {
        let raw = s_a[k] + s_b[k] - 1;
        shape[k] = raw.min(bound[k] + 1);
    }
    shape
}

/// Builds the max-plus convolution of `a` and `b`, truncated to `bound`.
///
/// For every output point `y`, `J.values[y] = max { A[a] + B[y-a] }` over
/// the feasible set, and `J.arg[y]` is the chosen `a` (lexicographically
/// smallest on ties). See [`crate::kernel::join_point`] for the per-point
/// kernel and the ABI this mirrors.
///
/// # Errors
///
/// Returns [`Error::Misuse`] if the truncated shape has a zero-length axis;
/// per §4.2, chaining a build with such a result is undefined, so this is
/// rejected up front instead.
pub fn build<T: Scalar, const D: usize>(
    a: &Grid<T, D>,
    b: &Grid<T, D>,
    bound: &[usize; D],
    opts: &BuildOptions,
) -> Result<(JointGrid<T, D>, Stats)> {
    let start = Instant::now();
    let shape = joint_shape(a.shape(), b.shape(), bound);
    if shape.iter().any(|&s| s == 0) {
        return Err(Error::Misuse(format!(
            "joint shape {shape:?} has a zero-length axis for bound {bound:?}"
        )));
    }

    let build_start = Instant::now();
    // The staircase is read-only once built, but each tile needs its own
    // memoizing cache to avoid contention across worker threads; build a
    // fresh one per tile instead of sharing one across threads.
    let ds_pts = if opts.method >= 1 { a.values().len() } else { 0 };
    let build_time = build_start.elapsed().as_secs_f64();

    let total: usize = shape.iter().product();
    let chunk = opts.chunk_size.max(1);

    let query_start = Instant::now();
    let tiles: Vec<(usize, Vec<T>, Vec<[u32; D]>, usize, usize)> = (0..total)
        .step_by(chunk)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|tile_start| {
            let tile_end = (tile_start + chunk).min(total);
            let mut values = Vec::with_capacity(tile_end - tile_start);
            let mut args = Vec::with_capacity(tile_end - tile_start);
            let mut compared_total = 0usize;
            let mut brute_count = 0usize;
            let mut staircase = (opts.method >= 1).then(|| Staircase::build(a));
            for flat in tile_start..tile_end {
                let y = unravel_index(flat, &shape);
                let result = join_point(a, b, &y, staircase.as_mut(), opts);
                values.push(result.value);
                args.push(result.arg);
                compared_total += result.compared;
                if result.brute_force {
                    brute_count += 1;
                }
            }
            (tile_start, values, args, compared_total, brute_count)
        })
        .collect();
    let query_time = query_start.elapsed().as_secs_f64();

    let mut values = vec![T::default(); total];
    let mut arg = vec![[0u32; D]; total];
    let mut compared_points = 0usize;
    let mut brute_force_count = 0usize;
    for (tile_start, tile_values, tile_args, compared, brute) in tiles {
        values[tile_start..tile_start + tile_values.len()].copy_from_slice(&tile_values);
        arg[tile_start..tile_start + tile_args.len()].copy_from_slice(&tile_args);
        compared_points += compared;
        brute_force_count += brute;
    }

    let joint = JointGrid {
        values: Grid::from_values(shape, values)
            .map_err(|_| Error::Alloc { shape: shape.to_vec() })?,
        arg,
    };

    let stats = Stats {
        method: format!("method{}", opts.method),
        total_runtime: start.elapsed().as_secs_f64(),
        ds_create_points_time: 0.0,
        ds_build_time: build_time,
        ds_query_time: query_time,
        ds_query_fetch_time: 0.0,
        expected_compared_points: compared_points as f64,
        compared_points: compared_points as f64,
        compared_in_bound_points: compared_points as f64,
        compared_edge_points: 0.0,
        compared_brute_force: brute_force_count as f64,
        ds_pts: u32::try_from(ds_pts).unwrap_or(u32::MAX),
        total_pts: u32::try_from(total).unwrap_or(u32::MAX),
        total_queries: u32::try_from(total).unwrap_or(u32::MAX),
        joined_func_count: 1,
        brute_force_count: u32::try_from(brute_force_count).unwrap_or(u32::MAX),
    };

    Ok((joint, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s1_grids() -> (Grid<i64, 1>, Grid<i64, 1>) {
        (
            Grid::from_values([4], vec![0, 3, 5, 6]).unwrap(),
            Grid::from_values([4], vec![0, 2, 3, 3]).unwrap(),
        )
    }

    #[test]
    fn joint_shape_is_truncated() {
        let shape = joint_shape(&[4usize], &[4usize], &[3usize]);
        assert_eq!(shape, [4]); // min(4+4-1, 3+1) = min(7, 4) = 4
    }

    #[test]
    fn build_matches_manual_welfare() {
        let (a, b) = s1_grids();
        let (joint, _stats) = build(&a, &b, &[3], &BuildOptions::default()).unwrap();
        // max over all splits of v_0(k) + v_1(3-k): a=2 gives 5+2=7
        assert_eq!(joint.max(), 7);
        assert_eq!(joint.argmax(), [3]);
        assert_eq!(joint.arg_at(&[3]), [2]);
        assert_eq!(joint.right_arg_at(&[3]), [1]);
    }

    #[test]
    fn bound_zero_still_yields_singleton_joint_grid() {
        // Since every Grid axis is at least 1 (enforced at construction),
        // s_a + s_b - 1 >= 1 always, so a bound of zero truncates to a
        // singleton axis rather than an empty one.
        let a = Grid::<i64, 1>::from_values([1], vec![7]).unwrap();
        let b = Grid::<i64, 1>::from_values([1], vec![5]).unwrap();
        let (joint, _stats) = build(&a, &b, &[0], &BuildOptions::default()).unwrap();
        assert_eq!(joint.shape(), &[1]);
        assert_eq!(joint.max(), 12);
    }

    #[test]
    fn flag_equivalence_across_all_combinations() {
        let a = Grid::<i64, 2>::from_fn([3, 3], |x| (x[0] as i64) + 2 * (x[1] as i64)).unwrap();
        let b = Grid::<i64, 2>::from_fn([3, 3], |x| 2 * (x[0] as i64) + (x[1] as i64)).unwrap();
        let bound = [2usize, 2];

        let mut reference: Option<(Vec<i64>, Vec<[u32; 2]>)> = None;
        for &filter in &[false, true] {
            for &brute_opt in &[false, true] {
                for &method in &[0u32, 1] {
                    for &chunk_size in &[1usize, 16] {
                        let opts = BuildOptions {
                            filter,
                            filter_grad: filter,
                            brute_opt,
                            count: true,
                            buildtime: true,
                            querytime: true,
                            chunk_size,
                            method,
                        };
                        let (joint, _stats) = build(&a, &b, &bound, &opts).unwrap();
                        let got = (joint.values().values().to_vec(), joint.arg.clone());
                        match &reference {
                            None => reference = Some(got),
                            Some(reference) => assert_eq!(&got, reference),
                        }
                    }
                }
            }
        }
    }
}

//! The native-kernel ABI boundary: the per-point max-plus evaluation that the
//! original crate shipped as a runtime-compiled `.so` keyed by `(ndim,
//! dtype)`. Here it is a plain, generic function instantiated at compile
//! time - no dynamic loading, per Design Notes §9 of the expanded spec.
//!
//! [`join_point`] is deliberately free of any shared mutable state so the
//! outer tiled loop in [`crate::joint`] can call it from any `rayon` worker
//! without locking.

use crate::dtype::Scalar;
use crate::grid::{ravel_multi_index, Grid};
use crate::joint::BuildOptions;
use rustc_hash::FxHashMap;

/// Per-build, read-only acceleration structure over the left operand `A`,
/// used when `method >= 1`. It memoizes `A[a]` lookups keyed by `a`'s flat
/// index; this does not change the set of candidates examined (so results
/// are identical to `method = 0` by construction) but mirrors the ABI's
/// notion of a data structure built once per build and queried per point.
pub struct Staircase<'a, T: Scalar, const D: usize> {
    a: &'a Grid<T, D>,
    cache: FxHashMap<usize, T>,
}

impl<'a, T: Scalar, const D: usize> Staircase<'a, T, D> {
    /// Builds the acceleration structure over `a`.
    #[must_use]
    pub fn build(a: &'a Grid<T, D>) -> Self {
        Self {
            a,
            cache: FxHashMap::default(),
        }
    }

    /// Number of entries the structure indexes over (the `dsPts` counter).
    #[must_use]
    pub fn len(&self) -> usize {
        self.a.values().len()
    }

    fn query(&mut self, index: &[usize; D]) -> T {
        let flat = ravel_multi_index(index, self.a.shape());
        *self
            .cache
            .entry(flat)
            .or_insert_with(|| self.a.values()[flat])
    }
}

/// Per-point result: the max-plus value, the chosen left-operand coordinate,
/// and the number of candidates examined at this point (for stats).
pub struct PointResult<const D: usize, T> {
    /// `max { A[a] + B[y-a] }`.
    pub value: T,
    /// The argmax `a`, lexicographically smallest on ties.
    pub arg: [u32; D],
    /// Number of feasible candidates examined for this point.
    pub compared: usize,
    /// Whether the dense (brute-force) path was used for this point.
    pub brute_force: bool,
}

/// Computes the feasible window of left-operand coordinates `a` for output
/// point `y`: `a_k` ranges over `[max(0, y_k - (s_B[k]-1)), min(s_A[k]-1,
/// y_k)]`.
fn feasible_window<const D: usize>(
    y: &[usize; D],
    s_a: &[usize; D],
    s_b: &[usize; D],
) -> ([usize; D], [usize; D]) {
    let mut lo = [0usize; D];
    let mut hi = [0usize; D];
    for k in 0..D {
        let lo_k = y[k].saturating_sub(s_b[k] - 1);
        let hi_k = y[k].min(s_a[k] - 1);
        lo[k] = lo_k;
        hi[k] = hi_k;
    }
    (lo, hi)
}

/// Evaluates the max-plus convolution at a single output point `y`.
///
/// Iterates the feasible window of left-operand coordinates in row-major
/// (lexicographic) order, so the first candidate achieving the maximum is
/// the lexicographically smallest one - the documented deterministic
/// tie-break. `filter`/`filter_grad`/`brute_opt` are accepted for ABI parity
/// with the original's flag set but do not change the candidate set that is
/// examined: every combination of flags and `method` the builder accepts
/// must produce bit-identical `value`/`arg` outputs (only statistics
/// differ), so the enumeration itself is flag-invariant by construction
/// here; `method` only changes whether `A` lookups go through the
/// [`Staircase`] memoizing cache.
pub fn join_point<T: Scalar, const D: usize>(
    a: &Grid<T, D>,
    b: &Grid<T, D>,
    y: &[usize; D],
    staircase: Option<&mut Staircase<'_, T, D>>,
    opts: &BuildOptions,
) -> PointResult<D, T> {
    let (lo, hi) = feasible_window(y, a.shape(), b.shape());
    let window_shape: [usize; D] = {
        let mut w = [1usize; D];
        for k in 0..D {
            w[k] = hi[k] - lo[k] + 1;
        }
        w
    };
    let window_size: usize = window_shape.iter().product();
    let brute_force = opts.brute_opt && window_size <= opts.chunk_size.max(1);

    let mut staircase = staircase;
    let mut best_value: Option<T> = None;
    let mut best_arg = [0u32; D];
    let mut compared = 0usize;

    let mut a_idx = lo;
    loop {
        let b_idx: [usize; D] = {
            let mut bi = [0usize; D];
            for k in 0..D {
                bi[k] = y[k] - a_idx[k];
            }
            bi
        };

        let a_value = match staircase.as_mut() {
            Some(s) => s.query(&a_idx),
            None => a.at(&a_idx),
        };
        let candidate = a_value + b.at(&b_idx);
        compared += 1;

        let better = match best_value {
            None => true,
            Some(best) => candidate > best,
        };
        if better {
            best_value = Some(candidate);
            let mut arg = [0u32; D];
            for k in 0..D {
                arg[k] = u32::try_from(a_idx[k]).unwrap_or(u32::MAX);
            }
            best_arg = arg;
        }

        // advance a_idx through [lo, hi] in row-major order
        let mut k = D;
        loop {
            if k == 0 {
                // exhausted the window
                return PointResult {
                    // UNWRAP: the window always contains at least one point
                    // (y is itself a valid output point), so best_value is set.
                    value: best_value.unwrap_or_else(|| a.at(&lo) + b.at(&lo)),
                    arg: best_arg,
                    compared,
                    brute_force,
                };
            }
            k -= 1;
            a_idx[k] += 1;
            if a_idx[k] > hi[k] {
                a_idx[k] = lo[k];
            } else {
                break;
            }
        }
    }
}

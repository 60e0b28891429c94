//! The Chain Reducer: folds a sequence of valuation grids pairwise into a
//! single joint grid via repeated max-plus convolution, retaining every
//! intermediate so allocations can be recovered for each original bidder.

use crate::dtype::Scalar;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::joint::{build, BuildOptions, JointGrid};
use crate::stats::StatsHistory;

/// Computes the zig-zag join order described in the original `joint_func`:
/// sort bidders ascending by their grid's maximum value into `s`, then build
/// `order = [s[-1], *s[:-2:2], *s[1:-2:2][::-1], s[-2]]` exactly as the
/// original slices it - the largest-valued grid joins first, the
/// second-largest joins last, and everything else alternates even/odd
/// positions (reversed on the odd side) in between. Returns `(order,
/// inverse_order)`; `inverse_order[i]` is the position of original index `i`
/// within `order`.
#[must_use]
pub fn order_for_reduction<T: Scalar>(maxima: &[T]) -> (Vec<usize>, Vec<usize>) {
    let n = maxima.len();
    let mut s: Vec<usize> = (0..n).collect();
    s.sort_by(|&i, &j| maxima[i].partial_cmp(&maxima[j]).unwrap());

    let order = if n == 0 {
        Vec::new()
    } else if n == 1 {
        vec![s[0]]
    } else {
        // `limit` is the original's `-2` slice stop, i.e. `len(s) - 2`: both
        // the even-indexed and odd-indexed runs stop short of `s[-2]`/`s[-1]`
        // so those two never appear twice.
        let limit = n - 2;

        let mut evens = Vec::new();
        let mut idx = 0usize;
        while idx < limit {
            evens.push(s[idx]);
            idx += 2;
        }

        let mut odds = Vec::new();
        let mut idx = 1usize;
        while idx < limit {
            odds.push(s[idx]);
            idx += 2;
        }
        odds.reverse();

        let mut order = Vec::with_capacity(n);
        order.push(s[n - 1]);
        order.extend(evens);
        order.extend(odds);
        order.push(s[n - 2]);
        order
    };

    let mut inverse_order = vec![0usize; n];
    for (position, &original) in order.iter().enumerate() {
        inverse_order[original] = position;
    }
    (order, inverse_order)
}

/// The full chain of intermediate joint grids produced by [`reduce`], plus
/// the join order used and its inverse.
#[derive(Clone, Debug)]
pub struct Chain<T: Scalar, const D: usize> {
    joints: Vec<JointGrid<T, D>>,
    order: Vec<usize>,
    inverse_order: Vec<usize>,
    /// Merged statistics across every build call performed by the reduction.
    pub stats: StatsHistory,
}

impl<T: Scalar, const D: usize> Chain<T, D> {
    /// All intermediate joint grids, in fold order (`joints[0]` combines
    /// `order[0]` and `order[1]`; `joints[k]` for `k >= 1` combines
    /// `joints[k-1]` with `order[k+1]`).
    #[must_use]
    pub fn joints(&self) -> &[JointGrid<T, D>] {
        &self.joints
    }

    /// The join order used (indices into the original `grids` slice).
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// `inverse_order[i]` is the position of original index `i` in `order`.
    #[must_use]
    pub fn inverse_order(&self) -> &[usize] {
        &self.inverse_order
    }

    /// The final joint grid: total social welfare is `self.last().max()`.
    ///
    /// # Panics
    ///
    /// Panics if the chain has no joints, which [`reduce`] never produces.
    #[must_use]
    pub fn last(&self) -> &JointGrid<T, D> {
        self.joints.last().expect("reduce always builds at least one joint")
    }

    /// Recovers each original bidder's allocation at the chain's argmax, by
    /// walking the retained intermediates from the last joint grid back to
    /// the first and splitting off the right operand's coordinate at each
    /// step. The result is indexed by the *original* `grids` order, not
    /// `order`, so callers never need to apply `inverse_order` themselves.
    #[must_use]
    pub fn recover_args(&self) -> Vec<[usize; D]> {
        let n = self.order.len();
        let mut allocations = vec![[0usize; D]; n];
        let last_idx = self.joints.len() - 1;
        let mut y = self.joints[last_idx].argmax();
        for i in (0..=last_idx).rev() {
            let joint = &self.joints[i];
            allocations[self.order[i + 1]] = joint.right_arg_at(&y);
            let left = joint.arg_at(&y);
            if i == 0 {
                allocations[self.order[0]] = left;
            } else {
                y = left;
            }
        }
        allocations
    }
}

/// Folds `grids` pairwise into a single [`Chain`], truncating every
/// intermediate to `bound`. When `reorder` is set, bidders are folded in
/// the zig-zag order of [`order_for_reduction`] rather than input order.
///
/// # Errors
///
/// Returns [`Error::Misuse`] if fewer than two grids are given, or if any
/// intermediate [`build`] call fails (e.g. a zero-length truncated axis).
pub fn reduce<T: Scalar, const D: usize>(
    grids: &[Grid<T, D>],
    bound: &[usize; D],
    reorder: bool,
    opts: &BuildOptions,
) -> Result<Chain<T, D>> {
    if grids.len() < 2 {
        return Err(Error::Misuse(format!(
            "chain reduction needs at least 2 valuations, got {}",
            grids.len()
        )));
    }

    let order = if reorder {
        let maxima: Vec<T> = grids.iter().map(Grid::max).collect();
        order_for_reduction(&maxima).0
    } else {
        (0..grids.len()).collect()
    };

    reduce_with_order(grids, bound, order, opts)
}

/// As [`reduce`], but folds `grids` in exactly the given `order` instead of
/// computing one. Used by the VCG driver to build the forward chain and the
/// reverse chain (the same bidders, folded back to front) from a single
/// shared order.
///
/// # Errors
///
/// Returns [`Error::Misuse`] if `order` has fewer than two entries, or if
/// any intermediate [`build`] call fails.
pub fn reduce_with_order<T: Scalar, const D: usize>(
    grids: &[Grid<T, D>],
    bound: &[usize; D],
    order: Vec<usize>,
    opts: &BuildOptions,
) -> Result<Chain<T, D>> {
    if order.len() < 2 {
        return Err(Error::Misuse(format!(
            "chain reduction needs at least 2 valuations, got {}",
            order.len()
        )));
    }

    let mut inverse_order = vec![0usize; order.len()];
    for (position, &original) in order.iter().enumerate() {
        inverse_order[original] = position;
    }

    let (joint0, stats0) = build(&grids[order[0]], &grids[order[1]], bound, opts)?;
    let mut joints = vec![joint0];
    let mut stats = stats0.into_history();

    for &idx in &order[2..] {
        let prev = joints.last().expect("just pushed").values();
        let (joint, s) = build(prev, &grids[idx], bound, opts)?;
        stats = stats.merge(s);
        joints.push(joint);
    }

    Ok(Chain {
        joints,
        order,
        inverse_order,
        stats,
    })
}

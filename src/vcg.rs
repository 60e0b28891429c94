//! The VCG Driver: ties the Joint-Function Builder / Chain Reducer and the
//! Maille-Tuffin Solver together into the two public entry points that
//! compute a full Vickrey-Clarke-Groves outcome - welfare, allocations, and
//! (optionally) payments.

use crate::chain::{order_for_reduction, reduce_with_order, Chain};
use crate::dtype::Scalar;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::joint::{build, BuildOptions};
use crate::maille_tuffin::solve_multi_resource;
use crate::stats::StatsHistory;
use float_cmp::approx_eq;

/// Tolerance used for every welfare/payment consistency check in this
/// module; both engines work over exact arithmetic most of the time, but
/// `f32`/`f64` valuations need a real margin.
const EPSILON: f64 = 1e-6;

/// Tuning knobs for [`vcg_join`].
#[derive(Clone, Debug)]
pub struct JoinOptions {
    /// Whether to fold bidders in the zig-zag order of
    /// [`order_for_reduction`] rather than input order.
    pub reorder: bool,
    /// Options forwarded to every [`build`] call.
    pub build: BuildOptions,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            reorder: true,
            build: BuildOptions::default(),
        }
    }
}

/// Join-engine-only diagnostics: the full forward and reverse welfare grids
/// and whether they agreed everywhere (`order_indifferent`).
#[derive(Clone, Debug)]
pub struct JoinDiagnostics<T: Scalar, const D: usize> {
    /// Welfare grid from folding bidders in forward order.
    pub forward_values: Grid<T, D>,
    /// Welfare grid from folding bidders in reverse order.
    pub reverse_values: Grid<T, D>,
    /// Whether `forward_values` and `reverse_values` agree at every point.
    pub order_indifferent: bool,
}

/// The result of a VCG computation: the optimal allocation, its welfare,
/// and (if requested) VCG payments.
#[derive(Clone, Debug)]
pub struct Output<T: Scalar, const D: usize> {
    /// Total social welfare at the optimal allocation.
    pub sw: T,
    /// Total units allocated per resource axis.
    pub used_resources: [usize; D],
    /// `allocations[i]` is bidder `i`'s awarded bundle.
    pub allocations: Vec<[usize; D]>,
    /// `private_values[i] = valuations[i].at(&allocations[i])`.
    pub private_values: Vec<T>,
    /// VCG payments, one per bidder, if `calc_payments` was set.
    pub payments: Option<Vec<T>>,
    /// Merged statistics from every build/solve call made along the way.
    pub stats: StatsHistory,
    /// Join-engine-only diagnostics (`None` for the Maille-Tuffin engine).
    pub diagnostics: Option<JoinDiagnostics<T, D>>,
}

fn welfare_eq<T: Scalar>(a: T, b: T) -> bool {
    approx_eq!(f64, a.to_f64(), b.to_f64(), epsilon = EPSILON)
}

fn is_zero_bundle<const D: usize>(bundle: &[usize; D]) -> bool {
    bundle.iter().all(|&x| x == 0)
}

/// The grid representing the join of the first `m` bidders in `chain`'s
/// order (`chain.order()[0..m]`). `None` for `m == 0` (the empty join,
/// the additive identity for max-plus convolution).
fn partial_grid<'a, T: Scalar, const D: usize>(
    chain: &'a Chain<T, D>,
    grids: &'a [Grid<T, D>],
    m: usize,
) -> Option<&'a Grid<T, D>> {
    match m {
        0 => None,
        1 => Some(&grids[chain.order()[0]]),
        _ => Some(chain.joints()[m - 2].values()),
    }
}

/// Welfare of the best allocation with bidder at forward-order position
/// `pos` excluded, via the amortised formula
/// `W_{-i} = (F_{pos} \oplus R_{n-pos-1}).max()`, with the two endpoint
/// special cases (`pos == 0` or `pos == n-1`) handled by `partial_grid`
/// returning `None` for an empty prefix/suffix.
fn welfare_excluding<T: Scalar, const D: usize>(
    forward: &Chain<T, D>,
    reverse: &Chain<T, D>,
    valuations: &[Grid<T, D>],
    bound: &[usize; D],
    opts: &BuildOptions,
    pos: usize,
    n: usize,
) -> Result<(T, StatsHistory)> {
    let left = partial_grid(forward, valuations, pos);
    let right = partial_grid(reverse, valuations, n - pos - 1);
    match (left, right) {
        (None, None) => unreachable!("n >= 2 so a bidder can't be excluded from an empty set"),
        (None, Some(r)) => Ok((r.max(), StatsHistory::default())),
        (Some(l), None) => Ok((l.max(), StatsHistory::default())),
        (Some(l), Some(r)) => {
            let (joint, stats) = build(l, r, bound, opts)?;
            Ok((joint.max(), stats.into_history()))
        }
    }
}

/// Validates that every payment falls in `[0, private_values[i] + epsilon]`.
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] naming the first offending bidder.
pub fn validate_payments<T: Scalar>(payments: &[T], private_values: &[T]) -> Result<()> {
    for (i, (&p, &v)) in payments.iter().zip(private_values).enumerate() {
        let p64 = p.to_f64();
        let v64 = v.to_f64();
        if p64 < -EPSILON || p64 > v64 + EPSILON {
            return Err(Error::InvariantViolation(format!(
                "bidder {i}'s payment {p:?} is outside [0, {v:?}]"
            )));
        }
    }
    Ok(())
}

/// Computes a VCG outcome via the general max-plus join engine: a direct,
/// generalised port of the reference `joint_func` driver.
///
/// # Errors
///
/// Returns [`Error::Misuse`] if fewer than two valuations are given, or
/// [`Error::InvariantViolation`] if any of the driver's self-checks fail
/// (allocation sum, welfare consistency, order-indifference, payment
/// bounds).
pub fn vcg_join<T: Scalar, const D: usize>(
    valuations: &[Grid<T, D>],
    max_alloc: &[usize; D],
    calc_payments: bool,
    opts: &JoinOptions,
) -> Result<Output<T, D>> {
    let n = valuations.len();
    if n < 2 {
        return Err(Error::Misuse(format!(
            "vcg_join needs at least 2 valuations, got {n}"
        )));
    }

    let forward_order = if opts.reorder {
        let maxima: Vec<T> = valuations.iter().map(Grid::max).collect();
        order_for_reduction(&maxima).0
    } else {
        (0..n).collect()
    };
    let reverse_order: Vec<usize> = forward_order.iter().rev().copied().collect();

    // The forward/reverse value grids and `order_indifferent` are part of
    // the join engine's output contract regardless of `calc_payments` (see
    // the external-interface spec: only `payments` is conditional), so both
    // chains are always built, independently and in parallel.
    let (forward_chain, reverse_chain) = rayon::join(
        || reduce_with_order(valuations, max_alloc, forward_order.clone(), &opts.build),
        || reduce_with_order(valuations, max_alloc, reverse_order.clone(), &opts.build),
    );
    let (forward_chain, reverse_chain) = (forward_chain?, reverse_chain?);

    let sw = forward_chain.last().max();
    let used_resources = forward_chain.last().argmax();
    let allocations = forward_chain.recover_args();

    let mut summed = [0usize; D];
    for alloc in &allocations {
        for k in 0..D {
            summed[k] += alloc[k];
        }
    }
    if summed != used_resources {
        return Err(Error::InvariantViolation(format!(
            "allocations sum to {summed:?} but the joint grid reports {used_resources:?} used"
        )));
    }

    let private_values: Vec<T> = valuations
        .iter()
        .zip(&allocations)
        .map(|(grid, alloc)| grid.at(alloc))
        .collect();
    let private_sum = private_values
        .iter()
        .copied()
        .fold(T::default(), |acc, v| acc + v);
    if !welfare_eq(private_sum, sw) {
        return Err(Error::InvariantViolation(format!(
            "private values sum to {private_sum:?} but social welfare is {sw:?}"
        )));
    }

    let mut stats = forward_chain.stats.clone();
    stats = stats.merge_history(reverse_chain.stats.clone());

    // Diagnostics (forward/reverse grids, order-indifference) are part of
    // the join engine's output contract unconditionally; only `payments`
    // is gated on `calc_payments`.
    let reverse_sw = reverse_chain.last().max();
    if !welfare_eq(sw, reverse_sw) {
        return Err(Error::InvariantViolation(format!(
            "forward welfare {sw:?} disagrees with reverse welfare {reverse_sw:?}"
        )));
    }

    let forward_values = forward_chain.last().values().clone();
    let reverse_values = reverse_chain.last().values().clone();
    let order_indifferent = forward_values
        .indexed_iter()
        .zip(reverse_values.indexed_iter())
        .all(|((_, fv), (_, rv))| welfare_eq(fv, rv));
    if !order_indifferent {
        return Err(Error::InvariantViolation(
            "forward and reverse joins disagree at some point; this allocation is not order-indifferent"
                .to_string(),
        ));
    }

    let diagnostics = Some(JoinDiagnostics {
        forward_values,
        reverse_values,
        order_indifferent,
    });

    let mut payments = None;
    if calc_payments {
        let mut paid = vec![T::default(); n];
        for (i, alloc) in allocations.iter().enumerate() {
            if is_zero_bundle(alloc) {
                continue;
            }
            let pos = forward_chain.inverse_order()[i];
            let (w_minus_i, extra_stats) = welfare_excluding(
                &forward_chain,
                &reverse_chain,
                valuations,
                max_alloc,
                &opts.build,
                pos,
                n,
            )?;
            stats = stats.merge_history(extra_stats);
            paid[i] = (w_minus_i - sw) + private_values[i];
        }
        validate_payments(&paid, &private_values)?;
        payments = Some(paid);
    }

    Ok(Output {
        sw,
        used_resources,
        allocations,
        private_values,
        payments,
        stats,
        diagnostics,
    })
}

/// Computes a VCG outcome via the Maille-Tuffin engine: a direct port of
/// the reference `maille_tuffin` driver, valid only for separable concave
/// valuations.
///
/// # Errors
///
/// Returns [`Error::Misuse`] if fewer than two valuations are given or any
/// bidder's 1-D decomposition fails the concavity check, or
/// [`Error::InvariantViolation`] if a computed payment falls outside its
/// bounds.
pub fn vcg_maille_tuffin<T: Scalar, const D: usize>(
    valuations: &[Grid<T, D>],
    valuations_1d: &[[Grid<T, 1>; D]],
    max_alloc: &[usize; D],
    calc_payments: bool,
) -> Result<Output<T, D>> {
    let n = valuations.len();
    if n < 2 {
        return Err(Error::Misuse(format!(
            "vcg_maille_tuffin needs at least 2 valuations, got {n}"
        )));
    }

    let full = solve_multi_resource(valuations, valuations_1d, max_alloc)?;
    let mut stats = full.stats;
    let mut payments = None;

    if calc_payments {
        let mut paid = vec![T::default(); n];
        for i in 0..n {
            if is_zero_bundle(&full.allocations[i]) {
                continue;
            }
            let sub_valuations: Vec<Grid<T, D>> = valuations
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, g)| g.clone())
                .collect();
            let sub_valuations_1d: Vec<[Grid<T, 1>; D]> = valuations_1d
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, g)| g.clone())
                .collect();
            let sub = solve_multi_resource(&sub_valuations, &sub_valuations_1d, max_alloc)?;
            stats = stats.merge_history(sub.stats);

            let raw = (sub.sw - full.sw) + full.private_values[i];
            let clamp_ceiling = full.private_values[i];
            paid[i] = if raw.to_f64() > clamp_ceiling.to_f64() {
                clamp_ceiling
            } else {
                raw
            };
        }
        validate_payments(&paid, &full.private_values)?;
        payments = Some(paid);
    }

    Ok(Output {
        sw: full.sw,
        used_resources: full.used_resources,
        allocations: full.allocations,
        private_values: full.private_values,
        payments,
        stats,
        diagnostics: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s1_grids() -> Vec<Grid<i64, 1>> {
        vec![
            Grid::from_values([4], vec![0, 3, 5, 6]).unwrap(),
            Grid::from_values([4], vec![0, 2, 3, 3]).unwrap(),
        ]
    }

    #[test]
    fn vcg_join_rejects_single_valuation() {
        let v = vec![Grid::<i64, 1>::from_values([2], vec![0, 1]).unwrap()];
        let err = vcg_join(&v, &[1], false, &JoinOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
    }

    #[test]
    fn vcg_join_scenario_s1_welfare_and_allocation() {
        let valuations = s1_grids();
        let out = vcg_join(&valuations, &[3], false, &JoinOptions::default()).unwrap();
        assert_eq!(out.sw, 7);
        assert_eq!(out.used_resources, [3]);
        assert_eq!(out.allocations[0][0] + out.allocations[1][0], 3);
    }

    #[test]
    fn vcg_join_payments_are_bounded_and_present() {
        let valuations = s1_grids();
        let opts = JoinOptions::default();
        let out = vcg_join(&valuations, &[3], true, &opts).unwrap();
        let payments = out.payments.unwrap();
        for (p, v) in payments.iter().zip(&out.private_values) {
            assert!(*p >= 0);
            assert!(*p <= *v);
        }
        let diagnostics = out.diagnostics.unwrap();
        assert!(diagnostics.order_indifferent);
    }

    #[test]
    fn zero_bundle_bidder_pays_nothing() {
        // bidder 1 values everything at zero, so the optimum gives it nothing.
        let v0 = Grid::<i64, 1>::from_values([4], vec![0, 3, 5, 6]).unwrap();
        let v1 = Grid::<i64, 1>::from_values([4], vec![0, 0, 0, 0]).unwrap();
        let out = vcg_join(&[v0, v1], &[3], true, &JoinOptions::default()).unwrap();
        assert_eq!(out.allocations[1], [0]);
        assert_eq!(out.payments.unwrap()[1], 0);
    }

    #[test]
    fn vcg_matches_brute_force_welfare_small_case() {
        let valuations = s1_grids();
        let opts = JoinOptions {
            reorder: false,
            build: BuildOptions::default(),
        };
        let out = vcg_join(&valuations, &[3], false, &opts).unwrap();

        let mut best = i64::MIN;
        for k in 0..=3 {
            let candidate = valuations[0].at(&[k]) + valuations[1].at(&[3 - k]);
            best = best.max(candidate);
        }
        assert_eq!(out.sw, best);
    }

    #[test]
    fn vcg_maille_tuffin_matches_join_engine_on_separable_case() {
        let v0 = Grid::<i64, 1>::from_values([4], vec![0, 5, 8, 9]).unwrap();
        let v1 = Grid::<i64, 1>::from_values([4], vec![0, 4, 7, 9]).unwrap();

        let join_out = vcg_join(
            &[v0.clone(), v1.clone()],
            &[3],
            true,
            &JoinOptions::default(),
        )
        .unwrap();

        let mt_out = vcg_maille_tuffin(
            &[v0.clone(), v1.clone()],
            &[[v0], [v1]],
            &[3],
            true,
        )
        .unwrap();

        assert_eq!(join_out.sw, mt_out.sw);
    }

    #[test]
    fn vcg_maille_tuffin_rejects_non_concave_bids() {
        let v0 = Grid::<i64, 1>::from_values([3], vec![0, 1, 3]).unwrap(); // not concave
        let v1 = Grid::<i64, 1>::from_values([3], vec![0, 1, 2]).unwrap();
        let err = vcg_maille_tuffin(
            &[v0.clone(), v1.clone()],
            &[[v0], [v1]],
            &[2],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
    }
}

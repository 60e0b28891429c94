//! Statistics records and their aggregation, per §4.6.
//!
//! The original library returned statistics as a `ctypes.Structure` with a
//! fixed field layout (`vecfuncvcglib/stats.py`'s `VCGStats`) and aggregated
//! repeated calls into a loosely-typed dict where every numeric field became
//! a list. Here the same fixed layout is a concrete struct ([`Stats`]) and
//! its aggregated form is a second, parallel struct ([`StatsHistory`]) with
//! every numeric field widened to a `Vec` - a typed version of the same
//! "scalar-per-call vs. history-of-scalars" split, per Design Notes §9.

use serde::{Deserialize, Serialize};

/// A single call's statistics, matching the native-kernel ABI of §6 exactly:
/// named timers (seconds) and counters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Stats {
    /// Name of the acceleration method used (e.g. `"method0"`).
    pub method: String,
    /// Wall-clock time for the whole build call.
    pub total_runtime: f64,
    /// Time spent creating the points used by the acceleration structure.
    pub ds_create_points_time: f64,
    /// Time spent building the acceleration structure.
    pub ds_build_time: f64,
    /// Time spent querying the acceleration structure.
    pub ds_query_time: f64,
    /// Time spent fetching values for a query.
    pub ds_query_fetch_time: f64,
    /// Theoretical/expected number of compared points.
    pub expected_compared_points: f64,
    /// Actual number of compared points.
    pub compared_points: f64,
    /// Number of compared points that were in-bound (feasible).
    pub compared_in_bound_points: f64,
    /// Number of compared points at the edge of the feasible window.
    pub compared_edge_points: f64,
    /// Number of points handled by the dense (brute-force) path.
    pub compared_brute_force: f64,
    /// Number of points indexed by the acceleration structure.
    pub ds_pts: u32,
    /// Total number of points in the output grid.
    pub total_pts: u32,
    /// Total number of per-point queries issued.
    pub total_queries: u32,
    /// Number of joins performed (always `1` for a single build call).
    pub joined_func_count: u32,
    /// Number of points handled by the dense (brute-force) path.
    pub brute_force_count: u32,
}

impl Stats {
    /// Widens a single call's record into a singleton [`StatsHistory`].
    #[must_use]
    pub fn into_history(self) -> StatsHistory {
        StatsHistory {
            method: self.method,
            total_runtime: vec![self.total_runtime],
            ds_create_points_time: vec![self.ds_create_points_time],
            ds_build_time: vec![self.ds_build_time],
            ds_query_time: vec![self.ds_query_time],
            ds_query_fetch_time: vec![self.ds_query_fetch_time],
            expected_compared_points: vec![self.expected_compared_points],
            compared_points: vec![self.compared_points],
            compared_in_bound_points: vec![self.compared_in_bound_points],
            compared_edge_points: vec![self.compared_edge_points],
            compared_brute_force: vec![self.compared_brute_force],
            ds_pts: vec![self.ds_pts],
            total_pts: vec![self.total_pts],
            total_queries: vec![self.total_queries],
            joined_func_count: vec![self.joined_func_count],
            brute_force_count: vec![self.brute_force_count],
        }
    }
}

/// The concatenated history of several [`Stats`] records, per §4.6: a prior
/// list extends with the next call's scalar. `method` keeps the first
/// occurrence, matching the "non-numeric keys keep the first occurrence"
/// rule.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsHistory {
    /// First-seen method name.
    pub method: String,
    /// Per-call wall-clock times.
    pub total_runtime: Vec<f64>,
    /// Per-call data-structure creation times.
    pub ds_create_points_time: Vec<f64>,
    /// Per-call data-structure build times.
    pub ds_build_time: Vec<f64>,
    /// Per-call data-structure query times.
    pub ds_query_time: Vec<f64>,
    /// Per-call data-structure query-fetch times.
    pub ds_query_fetch_time: Vec<f64>,
    /// Per-call expected compared-point counts.
    pub expected_compared_points: Vec<f64>,
    /// Per-call compared-point counts.
    pub compared_points: Vec<f64>,
    /// Per-call in-bound compared-point counts.
    pub compared_in_bound_points: Vec<f64>,
    /// Per-call edge compared-point counts.
    pub compared_edge_points: Vec<f64>,
    /// Per-call brute-force compared-point counts.
    pub compared_brute_force: Vec<f64>,
    /// Per-call acceleration-structure sizes.
    pub ds_pts: Vec<u32>,
    /// Per-call output-grid sizes.
    pub total_pts: Vec<u32>,
    /// Per-call query counts.
    pub total_queries: Vec<u32>,
    /// Per-call join counts.
    pub joined_func_count: Vec<u32>,
    /// Per-call brute-force point counts.
    pub brute_force_count: Vec<u32>,
}

impl StatsHistory {
    /// Folds one more call's [`Stats`] into this history, in call order.
    #[must_use]
    pub fn merge(mut self, next: Stats) -> Self {
        if self.method.is_empty() {
            self.method = next.method;
        }
        self.total_runtime.push(next.total_runtime);
        self.ds_create_points_time.push(next.ds_create_points_time);
        self.ds_build_time.push(next.ds_build_time);
        self.ds_query_time.push(next.ds_query_time);
        self.ds_query_fetch_time.push(next.ds_query_fetch_time);
        self.expected_compared_points
            .push(next.expected_compared_points);
        self.compared_points.push(next.compared_points);
        self.compared_in_bound_points
            .push(next.compared_in_bound_points);
        self.compared_edge_points.push(next.compared_edge_points);
        self.compared_brute_force.push(next.compared_brute_force);
        self.ds_pts.push(next.ds_pts);
        self.total_pts.push(next.total_pts);
        self.total_queries.push(next.total_queries);
        self.joined_func_count.push(next.joined_func_count);
        self.brute_force_count.push(next.brute_force_count);
        self
    }

    /// Folds another history into this one, in call order. Associative: this
    /// crate's only guarantee is `merge_history` itself, not that
    /// `merge`/`merge_history` are interchangeable fold orders beyond that.
    #[must_use]
    pub fn merge_history(mut self, other: Self) -> Self {
        if self.method.is_empty() {
            self.method = other.method;
        }
        self.total_runtime.extend(other.total_runtime);
        self.ds_create_points_time
            .extend(other.ds_create_points_time);
        self.ds_build_time.extend(other.ds_build_time);
        self.ds_query_time.extend(other.ds_query_time);
        self.ds_query_fetch_time.extend(other.ds_query_fetch_time);
        self.expected_compared_points
            .extend(other.expected_compared_points);
        self.compared_points.extend(other.compared_points);
        self.compared_in_bound_points
            .extend(other.compared_in_bound_points);
        self.compared_edge_points.extend(other.compared_edge_points);
        self.compared_brute_force.extend(other.compared_brute_force);
        self.ds_pts.extend(other.ds_pts);
        self.total_pts.extend(other.total_pts);
        self.total_queries.extend(other.total_queries);
        self.joined_func_count.extend(other.joined_func_count);
        self.brute_force_count.extend(other.brute_force_count);
        self
    }
}

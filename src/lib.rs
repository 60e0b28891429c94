#![warn(clippy::all, clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

//! VCG combinatorial-auction core: computes Vickrey-Clarke-Groves outcomes
//! (welfare-optimal allocations and incentive-compatible payments) over
//! multi-dimensional integer bundle grids, via two interchangeable engines -
//! a general max-plus (tropical) convolution join and a fast
//! Maille-Tuffin greedy solver restricted to separable concave valuations.

pub mod chain;
pub mod dtype;
pub mod error;
pub mod grid;
pub mod joint;
pub mod kernel;
pub mod maille_tuffin;
pub mod stats;
pub mod vcg;

pub use dtype::{Dtype, Scalar};
pub use error::{Error, Result};
pub use grid::Grid;
pub use joint::{build, BuildOptions, JointGrid};
pub use stats::{Stats, StatsHistory};
pub use vcg::{vcg_join, vcg_maille_tuffin, validate_payments, JoinDiagnostics, JoinOptions, Output};

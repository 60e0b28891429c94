//! Dense D-dimensional valuation grids.
//!
//! A [`Grid`] is the dense array of value scalars `values[i_1..i_D] = v(x)`
//! described in the data model: immutable once built, indexed in row-major
//! (C) order. The ravel/unravel helpers are a direct generalization of
//! `PackedArray`'s flat-index arithmetic from the teacher crate, specialized
//! here to a dense (not sparse) backing store since valuation grids arrive
//! fully materialised rather than filled incrementally.

use crate::dtype::{Dtype, Scalar};
use crate::error::{Error, Result};
use std::ops::Index;

/// A dense `D`-dimensional array of value scalars.
///
/// `values[x] = v(x)` where `x` is an integer bundle with `x_k` in
/// `[0, shape[k])`. Immutable after construction.
#[derive(Clone, Debug)]
pub struct Grid<T: Scalar, const D: usize> {
    shape: [usize; D],
    values: Vec<T>,
}

/// Converts a `multi_index` into a flat, row-major index.
#[must_use]
pub fn ravel_multi_index<const D: usize>(multi_index: &[usize; D], shape: &[usize; D]) -> usize {
    multi_index
        .iter()
        .zip(shape)
        .fold(0, |acc, (&i, &d)| acc * d + i)
}

/// Converts a flat, row-major `index` into a multi-index.
#[must_use]
pub fn unravel_index<const D: usize>(mut index: usize, shape: &[usize; D]) -> [usize; D] {
    let mut indices = [0usize; D];
    for (i, &d) in indices.iter_mut().zip(shape).rev() {
        *i = index % d;
        index /= d;
    }
    indices
}

impl<T: Scalar, const D: usize> Grid<T, D> {
    /// Dimensionality of every `Grid<T, D>` instance, fixed at compile time.
    pub const DIM: usize = D;

    /// Constructs a `Grid` from a row-major flattened value buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misuse`] if `shape` has a zero-length axis or if
    /// `values.len()` does not equal the product of `shape`.
    pub fn from_values(shape: [usize; D], values: Vec<T>) -> Result<Self> {
        if shape.iter().any(|&s| s == 0) {
            return Err(Error::Misuse(format!(
                "grid shape {shape:?} has a zero-length axis"
            )));
        }
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(Error::Misuse(format!(
                "grid shape {shape:?} expects {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Constructs a `Grid` by evaluating `f` at every point of `shape`, in
    /// row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Misuse`] if `shape` has a zero-length axis.
    pub fn from_fn(shape: [usize; D], mut f: impl FnMut(&[usize; D]) -> T) -> Result<Self> {
        if shape.iter().any(|&s| s == 0) {
            return Err(Error::Misuse(format!(
                "grid shape {shape:?} has a zero-length axis"
            )));
        }
        let total: usize = shape.iter().product();
        let values = (0..total)
            .map(|flat| f(&unravel_index(flat, &shape)))
            .collect();
        Ok(Self { shape, values })
    }

    /// The shape of this grid.
    #[must_use]
    pub const fn shape(&self) -> &[usize; D] {
        &self.shape
    }

    /// The runtime scalar-type tag of this grid.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        T::DTYPE
    }

    /// Returns the value at `x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` is out of bounds for this grid's shape: an out-of-range
    /// index is a programmer error, not a runtime-recoverable condition.
    #[must_use]
    pub fn at(&self, x: &[usize; D]) -> T {
        assert!(
            x.iter().zip(&self.shape).all(|(&i, &d)| i < d),
            "index {x:?} out of bounds for grid of shape {:?}",
            self.shape
        );
        self.values[ravel_multi_index(x, &self.shape)]
    }

    /// Returns the coordinate of the maximal value, breaking ties toward the
    /// lexicographically smallest coordinate.
    #[must_use]
    pub fn argmax(&self) -> [usize; D] {
        let mut best_flat = 0;
        let mut best_value = self.values[0];
        for (flat, &value) in self.values.iter().enumerate().skip(1) {
            if value > best_value {
                best_value = value;
                best_flat = flat;
            }
        }
        unravel_index(best_flat, &self.shape)
    }

    /// Returns the maximal value in this grid.
    #[must_use]
    pub fn max(&self) -> T {
        self.values
            .iter()
            .copied()
            .fold(self.values[0], |acc, v| if v > acc { v } else { acc })
    }

    /// Returns an iterator over `(coordinate, value)` pairs in row-major
    /// order.
    pub fn indexed_iter(&self) -> impl Iterator<Item = ([usize; D], T)> + '_ {
        let shape = self.shape;
        self.values
            .iter()
            .enumerate()
            .map(move |(flat, &v)| (unravel_index(flat, &shape), v))
    }

    /// Returns the raw row-major value buffer.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }
}

impl<T: Scalar, const D: usize> Index<&[usize; D]> for Grid<T, D> {
    type Output = T;

    fn index(&self, index: &[usize; D]) -> &Self::Output {
        assert!(
            index.iter().zip(&self.shape).all(|(&i, &d)| i < d),
            "index {index:?} out of bounds for grid of shape {:?}",
            self.shape
        );
        &self.values[ravel_multi_index(index, &self.shape)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ravel_unravel_roundtrip() {
        let shape = [3usize, 4, 5];
        for flat in 0..(3 * 4 * 5) {
            let idx = unravel_index(flat, &shape);
            assert_eq!(ravel_multi_index(&idx, &shape), flat);
        }
    }

    #[test]
    fn from_values_rejects_zero_axis() {
        let err = Grid::<i32, 2>::from_values([0, 3], vec![]).unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
    }

    #[test]
    fn from_values_rejects_length_mismatch() {
        let err = Grid::<i32, 2>::from_values([2, 2], vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
    }

    #[test]
    fn argmax_and_max_agree() {
        // v(x, y) = x + 2y over a 3x3 grid
        let grid = Grid::<i64, 2>::from_fn([3, 3], |x| (x[0] as i64) + 2 * (x[1] as i64)).unwrap();
        assert_eq!(grid.max(), 2 + 2 * 2);
        assert_eq!(grid.argmax(), [2, 2]);
    }

    #[test]
    fn at_matches_index_operator() {
        let grid = Grid::<f64, 1>::from_values([4], vec![0.0, 3.0, 5.0, 6.0]).unwrap();
        assert!((grid.at(&[2]) - 5.0).abs() < 1e-12);
        assert!((grid[&[2]] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn indexed_iter_visits_every_point_row_major() {
        let grid = Grid::<i32, 2>::from_fn([2, 3], |x| (x[0] * 10 + x[1]) as i32).unwrap();
        let visited: Vec<_> = grid.indexed_iter().collect();
        assert_eq!(
            visited,
            vec![
                ([0, 0], 0),
                ([0, 1], 1),
                ([0, 2], 2),
                ([1, 0], 10),
                ([1, 1], 11),
                ([1, 2], 12),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn at_out_of_bounds_panics() {
        let grid = Grid::<i32, 1>::from_values([2], vec![1, 2]).unwrap();
        let _ = grid.at(&[5]);
    }
}

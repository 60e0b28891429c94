//! Compile-time dimension/scalar instantiation, replacing the original
//! `vecfunc_vcg` loader's runtime `(ndim, dtype) -> compiled .so` lookup table
//! with Rust generics: every `(D, T)` combination this crate supports is
//! instantiated at build time, and `Dtype` exists only so a caller can ask a
//! [`Grid`](crate::grid::Grid) what scalar type it holds without downcasting.

use std::fmt;
use std::ops::{Add, Sub};

/// Runtime tag for the scalar types this crate is instantiated over.
///
/// Mirrors the `dtype` string the original loader normalized to
/// (`int32`/`int64`/`float32`/`float64`) before selecting a compiled module;
/// here it is purely informational, since dispatch happens at compile time
/// through the [`Scalar`] trait bound.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Dtype {
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::F32 => "float32",
            Self::F64 => "float64",
        })
    }
}

/// Sealed trait for the scalar types a [`Grid`](crate::grid::Grid) can hold.
///
/// The supported set is exactly the four types the original native kernel
/// was compiled for: two signed integer widths and two float widths. Adding a
/// fifth type means adding an impl here, not writing a new kernel.
pub trait Scalar:
    Copy
    + Default
    + PartialOrd
    + PartialEq
    + Add<Output = Self>
    + Sub<Output = Self>
    + Send
    + Sync
    + fmt::Debug
    + private::Sealed
{
    /// The runtime tag corresponding to `Self`.
    const DTYPE: Dtype;

    /// Converts to `f64` for tolerance comparisons; exact for `i32`/`i64`
    /// within their representable range, lossy only in the same way
    /// `float_cmp`-based comparisons already are for `f32`/`f64`.
    fn to_f64(self) -> f64;
}

mod private {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

impl Scalar for i32 {
    const DTYPE: Dtype = Dtype::I32;
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Scalar for i64 {
    const DTYPE: Dtype = Dtype::I64;
    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f32 {
    const DTYPE: Dtype = Dtype::F32;
    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Scalar for f64 {
    const DTYPE: Dtype = Dtype::F64;
    fn to_f64(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_tags_match() {
        assert_eq!(i32::DTYPE, Dtype::I32);
        assert_eq!(i64::DTYPE, Dtype::I64);
        assert_eq!(f32::DTYPE, Dtype::F32);
        assert_eq!(f64::DTYPE, Dtype::F64);
    }

    #[test]
    fn display_matches_original_normalization() {
        assert_eq!(Dtype::I32.to_string(), "int32");
        assert_eq!(Dtype::I64.to_string(), "int64");
        assert_eq!(Dtype::F32.to_string(), "float32");
        assert_eq!(Dtype::F64.to_string(), "float64");
    }
}

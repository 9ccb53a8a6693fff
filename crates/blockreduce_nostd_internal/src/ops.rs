//! Common reduction operators
//!
//! These are plain functions, so they can be handed straight to
//! [`ReduceKernel::new`](crate::ReduceKernel::new) (e.g.
//! `ReduceKernel::<256, _>::new(ops::add::<f64>)`). Any closure with the
//! signature `Fn(T, T) -> T` works just as well.

use core::ops::{Add, Mul};

#[inline(always)]
pub fn add<T: Add<Output = T>>(a: T, b: T) -> T {
    a + b
}

#[inline(always)]
pub fn mul<T: Mul<Output = T>>(a: T, b: T) -> T {
    a * b
}

/// the larger of `a` and `b` (`a` wins ties)
///
/// # Note
/// When `b` is NaN, the result is `a`. When `a` is NaN, the result is NaN.
/// This means that `max` is only commutative for inputs without NaNs.
#[inline(always)]
pub fn max<T: PartialOrd>(a: T, b: T) -> T {
    if b > a { b } else { a }
}

/// the smaller of `a` and `b` (`a` wins ties)
///
/// The same caveats about NaN apply as for [`max`]
#[inline(always)]
pub fn min<T: PartialOrd>(a: T, b: T) -> T {
    if b < a { b } else { a }
}

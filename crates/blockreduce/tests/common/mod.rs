// the reason this is named mod.rs has to do with some complexities of how
// testing is handled
//
// we are following the advice of the rust book
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)] // each test-file uses a different subset of helpers

use blockreduce::{Error, Executor, LaunchParam, ReduceKernel};
use ndarray::{Array1, ArrayView1};
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use std::num::NonZeroU32;

// based on numpy!
// https://numpy.org/doc/stable/reference/generated/numpy.isclose.html
pub fn isclose(actual: f64, ref_val: f64, rtol: f64, atol: f64) -> bool {
    let actual_nan = actual.is_nan();
    let ref_nan = ref_val.is_nan();
    if actual_nan || ref_nan {
        actual_nan && ref_nan
    } else {
        (actual - ref_val).abs() <= (atol + rtol * ref_val.abs())
    }
}

/// the sequential left-fold of `values` (`None` when `values` is empty)
pub fn sequential_fold<T: Copy>(values: &[T], func: impl Fn(T, T) -> T) -> Option<T> {
    let (first, rest) = values.split_first()?;
    Some(rest.iter().fold(*first, |acc, &x| func(acc, x)))
}

/// Random floats that hold integer values
///
/// Sums of integer-valued floats are exact (as long as they stay small), so
/// they are associative in practice.
pub fn random_integral_values(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Uniform::try_from(-50..100).unwrap();
    (0..len).map(|_| dist.sample(&mut rng) as f64).collect()
}

/// Random floats with non-trivial fractional parts
pub fn random_values(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Uniform::try_from(-1.0..1.0).unwrap();
    (0..len).map(|_| dist.sample(&mut rng)).collect()
}

pub fn launch(grid_size: u32) -> LaunchParam {
    LaunchParam::new(NonZeroU32::new(grid_size).unwrap())
}

/// Runs the kernel with `executor` and returns the destination array.
///
/// Every entry of the destination is initialized to `fill`, which makes it
/// easy to spot the entries that weren't written.
pub fn run_reduce<T, F, const BLOCK_SIZE: usize>(
    executor: &mut impl Executor,
    kernel: &ReduceKernel<BLOCK_SIZE, F>,
    source: &[T],
    n: usize,
    grid_size: u32,
    fill: T,
) -> Result<Array1<T>, Error>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let mut destination = Array1::from_elem(grid_size as usize, fill);
    executor.drive_reduce(
        kernel,
        ArrayView1::from(source),
        &mut destination.view_mut(),
        n,
        &launch(grid_size),
    )?;
    Ok(destination)
}

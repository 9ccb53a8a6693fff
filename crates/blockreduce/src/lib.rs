/*!
Provides a generic block-level parallel reduction, in the style of the
reduction kernels written for GPUs.

The problem is decomposed into a grid of blocks. Each block is a group of
`BLOCK_SIZE` threads that execute in lock-step, share a small scratch buffer,
and synchronize with a barrier. Given an array of `n` elements and an
associative binary operator, each block produces 1 partial result. Combining
the partial results into a single value is left to the caller.

# User Guide

```
use blockreduce::{Executor, LaunchParam, LockstepExecutor, ReduceKernel, ops};
use ndarray::{Array1, ArrayView1};
use std::num::NonZeroU32;

let source: Vec<f64> = (1..=10).map(|x| x as f64).collect();
let kernel = ReduceKernel::<4, _>::new(ops::add::<f64>);
let launch = LaunchParam::new(NonZeroU32::new(2).unwrap());

let mut partials = Array1::<f64>::zeros(launch.grid_size());
LockstepExecutor::default()
    .drive_reduce(
        &kernel,
        ArrayView1::from(&source[..]),
        &mut partials.view_mut(),
        source.len(),
        &launch,
    )
    .unwrap();
assert_eq!(partials.sum(), 55.0);
```

# Developer Guide

The kernel and the abstractions it relies upon live in
[`blockreduce_nostd_internal`], which doesn't need the standard library.
This crate provides the "host-side" machinery: the [`Executor`]s that play
the role of the accelerator (on the CPU) and the error type.

*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod config;
mod error;
mod executor;
mod parallel_lockstep;
mod parallel_threaded;

// pull in symbols that visible outside of the package
pub use blockreduce_nostd_internal::{
    ExecutionContext, FoldSchedule, OutputCell, ReduceKernel, SharedBuffer, StridedRange,
    fold_guard, ops,
};
pub use config::LaunchParam;
pub use error::Error;
pub use executor::Executor;
pub use parallel_lockstep::LockstepExecutor;
pub use parallel_threaded::ThreadedExecutor;

#![no_std]
mod context;
mod kernel;
mod shared;
mod strided;

// the functors are intentionally kept in their own namespace (`ops::add`
// reads better at call-sites than a bare `add`)
pub mod ops;

pub use context::ExecutionContext;
pub use kernel::{FoldSchedule, ReduceKernel, fold_guard};
pub use shared::{OutputCell, SharedBuffer};
pub use strided::StridedRange;

//! The block-level reduction kernel
//!
//! The kernel reduces an array of `n` elements to one partial result per
//! block. It proceeds in 3 phases, separated by barriers:
//!
//! 1. **grid reduce:** each thread walks the elements that it owns in a
//!    grid-stride loop (see [`StridedRange`]) and folds them into a single
//!    value. The loop is unrolled so that each iteration consumes 4 elements.
//! 2. **block reduce:** the per-thread values are written to the block's
//!    [`SharedBuffer`] and combined with a tree (fan-in) reduction. The tree
//!    repeatedly folds the upper `floor(width/2)` values onto the lower
//!    `ceil(width/2)` values, which works for any block size (not just powers
//!    of 2).
//! 3. **write-out:** thread 0 writes the block's value to
//!    `destination[block_index]`.
//!
//! Combining the per-block values into a single value is the caller's
//! responsibility.
//!
//! # Caller obligations
//! - the functor must be associative. If it isn't, you silently get a wrong
//!   answer.
//! - for a functor that isn't commutative, the result depends on the grid
//!   stride partition: different choices of block size or grid size group
//!   the elements differently. Each grouping is internally consistent, but
//!   there isn't a single canonical answer.
//! - the functor shouldn't panic. A panicking thread never reaches the next
//!   barrier.

use crate::context::ExecutionContext;
use crate::shared::{OutputCell, SharedBuffer};
use crate::strided::StridedRange;
use ndarray::ArrayView1;

/// Iterates over the steps of the tree reduction of `width` values.
///
/// Each step yields `(active_width, half)` where `half = ceil(active_width/2)`.
/// During a step, the value at `t + half` is folded into the value at `t` for
/// every `t + half < active_width`. The next step's active width is `half`.
///
/// For example, 6 values take the steps `(6, 3), (3, 2), (2, 1)` and 8 values
/// take the steps `(8, 4), (4, 2), (2, 1)`.
#[derive(Clone, Debug)]
pub struct FoldSchedule {
    active_width: usize,
}

impl FoldSchedule {
    pub fn new(width: usize) -> Self {
        FoldSchedule {
            active_width: width,
        }
    }
}

impl Iterator for FoldSchedule {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        if self.active_width <= 1 {
            return None;
        }
        let half = self.active_width.div_ceil(2);
        let step = (self.active_width, half);
        self.active_width = half;
        Some(step)
    }
}

/// Decides whether `thread_index` performs a merge during the tree-reduction
/// step described by `(active_width, half)`.
///
/// The thread merges the value at `thread_index + half` into its own value
/// when it sits in the lower half, the partner lies within the active width,
/// and both the thread and its partner held valid data at the start of the
/// reduction (i.e. their global indices are below `n`).
#[inline(always)]
pub fn fold_guard(
    block_index: usize,
    thread_index: usize,
    block_size: usize,
    n: usize,
    active_width: usize,
    half: usize,
) -> bool {
    let block_offset = block_index * block_size;
    thread_index < half
        && (thread_index + half) < active_width
        && (block_offset + thread_index + half) < n
        && (block_offset + thread_index) < n
}

/// Folds every element of `range` into a single value.
///
/// The first element seeds the result (so we never need a neutral element).
/// We then consume 4 elements per iteration, which gives each iteration more
/// independent work. The grouping within an iteration is fixed so results
/// don't depend on how the loop happens to be unrolled.
#[inline(always)]
fn accumulate<T, F>(range: &mut StridedRange<T>, func: &F) -> Option<T>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    let mut result = *range.next()?;

    while let Some([e0, e1, e2, e3]) = range.next_chunk4() {
        result = func(func(func(result, func(e0, e1)), e2), e3);
    }

    // the remaining 0-3 elements
    for &elem in range {
        result = func(result, elem);
    }
    Some(result)
}

/// A reduction kernel for blocks of `BLOCK_SIZE` threads.
///
/// `func` is the reduction's binary operator. See the module docs for the
/// algorithm and for the caller's obligations.
#[derive(Clone)]
pub struct ReduceKernel<const BLOCK_SIZE: usize, F> {
    func: F,
}

impl<const BLOCK_SIZE: usize, F> ReduceKernel<BLOCK_SIZE, F> {
    pub fn new(func: F) -> Self {
        const { assert!(BLOCK_SIZE > 0, "a block needs at least 1 thread") };
        ReduceKernel { func }
    }

    pub const fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// The kernel entry point.
    ///
    /// Every thread of every block calls this function with its own `ctx`.
    /// The remaining arguments are identical for all threads.
    ///
    /// - `source` holds the values to reduce. Only the first `n` entries are
    ///   considered.
    /// - `destination` receives one value per block. It should have an entry
    ///   for every block. An entry is left unwritten when its block doesn't
    ///   own any element (e.g. when `n == 0`).
    pub fn call<T, C>(
        &self,
        ctx: &C,
        source: ArrayView1<T>,
        destination: &[OutputCell<T>],
        n: usize,
    ) where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T,
        C: ExecutionContext<T, BLOCK_SIZE>,
    {
        let sdata: &SharedBuffer<T, BLOCK_SIZE> = ctx.alloc_shared();

        let block_index = ctx.grid_index();
        let thread_index = ctx.thread_index();
        // equivalent to block_index * BLOCK_SIZE + thread_index
        let linear_index = ctx.linear_index();
        let stride = ctx.grid_size().saturating_mul(BLOCK_SIZE);

        // --------
        // Level 1: grid reduce, reading from the source
        // --------
        let mut range = StridedRange::new(source, linear_index, stride, n);
        if linear_index < n {
            if let Some(partial) = accumulate(&mut range, &self.func) {
                // SAFETY: slot `thread_index` is written by this thread alone
                // and nobody reads it until after the barrier
                unsafe { sdata.store(thread_index, partial) };
            }
        }

        ctx.barrier();

        // --------
        // Level 2: block reduce, reading from the shared buffer
        // --------
        for (active_width, half) in FoldSchedule::new(BLOCK_SIZE) {
            if fold_guard(block_index, thread_index, BLOCK_SIZE, n, active_width, half) {
                // SAFETY: within a step, slots below `half` are written (each
                // by its own thread) and the other slots are only read
                unsafe {
                    if let (Some(lhs), Some(rhs)) =
                        (sdata.load(thread_index), sdata.load(thread_index + half))
                    {
                        sdata.store(thread_index, (self.func)(lhs, rhs));
                    }
                }
            }

            // the next step reads values written during this step
            ctx.barrier();
        }

        // store the block's result
        if thread_index == 0 && linear_index < n {
            // SAFETY: the last barrier ordered every write to slot 0 before
            // this read. Each block has exactly 1 thread 0, so each output
            // cell has at most 1 writer.
            unsafe {
                if let (Some(value), Some(cell)) = (sdata.load(0), destination.get(block_index)) {
                    cell.store(value);
                }
            }
        }
    }
}

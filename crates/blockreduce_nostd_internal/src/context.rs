//! Describes the capabilities that the reduction kernel borrows from the
//! "accelerator"
//!
//! The kernel is written from the perspective of a single thread. Everything
//! that the thread needs to know about where it lives in the grid (and the
//! only way it can coordinate with the other threads in its block) is
//! provided through an [`ExecutionContext`]. The kernel never knows whether
//! it is driven by real GPU threads, OS threads or a deterministic
//! simulation of a block.

use crate::shared::SharedBuffer;

/// The per-thread view of a kernel launch.
///
/// A launch is made up of `grid_size()` blocks. Each block is composed of
/// `BLOCK_SIZE` threads that execute in lock-step and share a single
/// [`SharedBuffer`]. A separate instance of the implementing type is handed
/// to each thread.
///
/// # Barrier discipline
/// Every thread of a block must make the same number of calls to
/// [`barrier`](Self::barrier). Code that branches on a thread's identity may
/// skip data accesses, but it must never skip a barrier (doing so would
/// deadlock the block or let a thread observe a half-written buffer).
pub trait ExecutionContext<T, const BLOCK_SIZE: usize> {
    /// index of this thread's block among all blocks in the grid
    fn grid_index(&self) -> usize;

    /// index of this thread within its block (always `< BLOCK_SIZE`)
    fn thread_index(&self) -> usize;

    /// total number of blocks in the grid
    fn grid_size(&self) -> usize;

    /// Returns the scratch buffer shared by every thread in this block.
    ///
    /// Each call (from any thread of the block) yields the same buffer. The
    /// buffer lives for the duration of the block's execution and its slots
    /// start out unwritten.
    fn alloc_shared(&self) -> &SharedBuffer<T, BLOCK_SIZE>;

    /// Blocks until every thread in the block has called this method.
    fn barrier(&self);

    /// global index of the thread: `grid_index() * BLOCK_SIZE + thread_index()`
    #[inline(always)]
    fn linear_index(&self) -> usize {
        self.grid_index() * BLOCK_SIZE + self.thread_index()
    }
}

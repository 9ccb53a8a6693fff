//! Implements the "threaded" backend, where every thread of a block is an OS
//! thread
//!
//! This is the closest CPU analogue to how a GPU executes the kernel. All of
//! the threads of a block really do run concurrently, and they really do
//! meet at a barrier. Up to `max_resident_blocks` blocks are in flight at
//! once; the rest of the grid is processed in successive "waves" (much like
//! a GPU that can only keep so many blocks resident).

use crate::config::LaunchParam;
use crate::error::Error;
use crate::executor::{Executor, alloc_output_cells, check_launch, copy_out, lock, spawn_worker};
use blockreduce_nostd_internal::{ExecutionContext, OutputCell, ReduceKernel, SharedBuffer};
use log::{debug, trace, warn};
use ndarray::{ArrayView1, ArrayViewMut1};
use std::num::NonZeroU32;
use std::ops::Range;
use std::sync::{Condvar, Mutex, PoisonError};

struct BarrierState {
    n_arrived: usize,
    generation: u64,
    // thread_index of the first thread that panicked
    culprit: Option<usize>,
}

/// A barrier for the threads of a single block.
///
/// This is similar to `std::sync::Barrier`, except that it can be poisoned.
/// When a thread panics, it poisons the barrier and every thread that is
/// waiting at (or later arrives at) the barrier panics too. Without this, a
/// single panicking thread would leave its peers waiting forever.
struct BlockBarrier {
    n_threads: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl BlockBarrier {
    fn new(n_threads: usize) -> Self {
        BlockBarrier {
            n_threads,
            state: Mutex::new(BarrierState {
                n_arrived: 0,
                generation: 0,
                culprit: None,
            }),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut state = lock(&self.state);
        let generation = state.generation;
        if state.culprit.is_none() {
            state.n_arrived += 1;
            if state.n_arrived == self.n_threads {
                state.n_arrived = 0;
                state.generation += 1;
                self.cvar.notify_all();
                return;
            }
            while state.generation == generation && state.culprit.is_none() {
                state = self.cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        }
        if state.generation == generation {
            drop(state);
            panic!("a thread in this block panicked before reaching the barrier");
        }
    }

    fn poison(&self, thread_index: usize) {
        let mut state = lock(&self.state);
        state.culprit.get_or_insert(thread_index);
        self.cvar.notify_all();
    }

    fn culprit(&self) -> Option<usize> {
        lock(&self.state).culprit
    }
}

/// Poisons the barrier if the thread unwinds
struct PanicGuard<'b> {
    barrier: &'b BlockBarrier,
    thread_index: usize,
}

impl Drop for PanicGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.barrier.poison(self.thread_index);
        }
    }
}

/// Holds the resources of a block that is resident on the "device"
struct ResidentBlock<T, const BLOCK_SIZE: usize> {
    grid_index: usize,
    shared: SharedBuffer<T, BLOCK_SIZE>,
    barrier: BlockBarrier,
}

/// The per-thread [`ExecutionContext`] of the threaded backend
struct ThreadContext<'b, T, const BLOCK_SIZE: usize> {
    thread_index: usize,
    grid_size: usize,
    block: &'b ResidentBlock<T, BLOCK_SIZE>,
}

impl<T, const BLOCK_SIZE: usize> ExecutionContext<T, BLOCK_SIZE>
    for ThreadContext<'_, T, BLOCK_SIZE>
{
    fn grid_index(&self) -> usize {
        self.block.grid_index
    }

    fn thread_index(&self) -> usize {
        self.thread_index
    }

    fn grid_size(&self) -> usize {
        self.grid_size
    }

    fn alloc_shared(&self) -> &SharedBuffer<T, BLOCK_SIZE> {
        &self.block.shared
    }

    fn barrier(&self) {
        self.block.barrier.wait()
    }
}

/// Executes each thread of a block on a separate OS thread.
pub struct ThreadedExecutor {
    max_resident_blocks: usize,
    stack_size: Option<usize>,
}

impl ThreadedExecutor {
    pub fn new(max_resident_blocks: NonZeroU32) -> Self {
        ThreadedExecutor {
            max_resident_blocks: max_resident_blocks.get() as usize,
            stack_size: None,
        }
    }

    /// Sets the stack size (in bytes) of every thread that gets launched.
    ///
    /// By default, threads get the platform's default stack size.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for ThreadedExecutor {
    /// keep 1 block resident per available core
    fn default() -> Self {
        let max_resident_blocks = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ThreadedExecutor {
            max_resident_blocks,
            stack_size: None,
        }
    }
}

/// Launches every thread of the blocks in `wave` and waits for them to finish
fn run_wave<T, F, const BLOCK_SIZE: usize>(
    kernel: &ReduceKernel<BLOCK_SIZE, F>,
    source: ArrayView1<T>,
    cells: &[OutputCell<T>],
    n: usize,
    grid_size: usize,
    wave: Range<usize>,
    stack_size: Option<usize>,
) -> Result<(), Error>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let blocks: Vec<ResidentBlock<T, BLOCK_SIZE>> = wave
        .map(|grid_index| ResidentBlock {
            grid_index,
            shared: SharedBuffer::new(),
            barrier: BlockBarrier::new(BLOCK_SIZE),
        })
        .collect();

    let (all_joined, spawn_failure) = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
        let mut spawn_failure = None;
        'blocks: for block in blocks.iter() {
            for thread_index in 0..BLOCK_SIZE {
                let ctx = ThreadContext {
                    thread_index,
                    grid_size,
                    block,
                };
                let spawned = spawn_worker(scope, stack_size, move || {
                    let _guard = PanicGuard {
                        barrier: &ctx.block.barrier,
                        thread_index,
                    };
                    kernel.call(&ctx, source, cells, n);
                });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        // the threads of this block that already started
                        // would wait forever on the missing thread. Blocks
                        // that were fully launched can still finish.
                        block.barrier.poison(thread_index);
                        spawn_failure = Some((block.grid_index, thread_index, err));
                        break 'blocks;
                    }
                }
            }
        }
        // join every handle, even after we've seen a failure
        let all_joined = handles
            .into_iter()
            .map(|handle| handle.join().is_ok())
            .fold(true, |acc, ok| acc && ok);
        (all_joined, spawn_failure)
    });

    if let Some((block_index, thread_index, err)) = spawn_failure {
        warn!("couldn't spawn thread {thread_index} of block {block_index}: {err}");
        return Err(Error::thread_spawn(block_index, thread_index, err));
    }
    if all_joined {
        return Ok(());
    }
    for block in blocks.iter() {
        if let Some(thread_index) = block.barrier.culprit() {
            warn!(
                "thread {thread_index} of block {} panicked during a reduction",
                block.grid_index
            );
            return Err(Error::worker_panicked(block.grid_index, thread_index));
        }
    }
    // every panicking thread poisons its barrier, so this is unreachable in
    // practice
    Err(Error::worker_panicked(0, 0))
}

impl Executor for ThreadedExecutor {
    fn drive_reduce<T, F, const BLOCK_SIZE: usize>(
        &mut self,
        kernel: &ReduceKernel<BLOCK_SIZE, F>,
        source: ArrayView1<T>,
        destination: &mut ArrayViewMut1<T>,
        n: usize,
        launch: &LaunchParam,
    ) -> Result<(), Error>
    where
        T: Copy + Send + Sync,
        F: Fn(T, T) -> T + Sync,
    {
        check_launch(source.len(), destination.len(), n, launch, BLOCK_SIZE)?;
        let grid_size = launch.grid_size();
        debug!(
            "threaded reduction: n = {n}, {grid_size} blocks of {BLOCK_SIZE} threads, \
             up to {} resident blocks",
            self.max_resident_blocks
        );

        let cells = alloc_output_cells(grid_size);
        let mut wave_start = 0;
        while wave_start < grid_size {
            let wave_stop = grid_size.min(wave_start + self.max_resident_blocks);
            trace!("launching blocks {wave_start}..{wave_stop}");
            run_wave(
                kernel,
                source,
                &cells,
                n,
                grid_size,
                wave_start..wave_stop,
                self.stack_size,
            )?;
            wave_start = wave_stop;
        }

        let n_written = copy_out(cells, destination);
        debug!("{n_written} of {grid_size} blocks produced a partial result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisoned_barrier_releases_waiting_peer() {
        let barrier = BlockBarrier::new(2);
        let peer_panicked = std::thread::scope(|scope| {
            let peer = scope.spawn(|| barrier.wait());
            // thread 1 never arrives
            barrier.poison(1);
            peer.join().is_err()
        });
        assert!(peer_panicked);
        assert_eq!(barrier.culprit(), Some(1));
    }

    #[test]
    fn barrier_poisoned_before_arrival() {
        let barrier = BlockBarrier::new(3);
        barrier.poison(2);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| barrier.wait()));
        assert!(result.is_err());
    }
}

//! Implements the "lockstep" backend, a deterministic simulation of a block
//!
//! Each thread of a block still gets its own OS thread (the kernel is written
//! from a single thread's perspective, so it needs a stack to suspend at a
//! barrier). But, the threads pass around a turn-token, so that exactly one
//! of them makes progress at a time:
//! - thread 0 runs until it reaches a barrier, then hands the token to
//!   thread 1, which runs until the same barrier, ...
//! - once the last thread reaches the barrier, the token returns to thread 0
//!   and the block proceeds to the next phase.
//!
//! Blocks are executed one after another, in order of their index. The
//! result is a single, fully reproducible interleaving of the whole launch.
//! This is mostly useful for debugging and testing (a data-race in the
//! kernel's index logic shows up here as a deterministic wrong answer rather
//! than as a flaky one).

use crate::config::LaunchParam;
use crate::error::Error;
use crate::executor::{Executor, alloc_output_cells, check_launch, copy_out, lock, spawn_worker};
use blockreduce_nostd_internal::{ExecutionContext, OutputCell, ReduceKernel, SharedBuffer};
use log::{debug, trace, warn};
use ndarray::{ArrayView1, ArrayViewMut1};
use std::sync::{Condvar, Mutex, PoisonError};

struct TurnState {
    turn: usize,
    culprit: Option<usize>,
}

/// The token that decides which thread of the block may run
struct TurnToken {
    n_threads: usize,
    state: Mutex<TurnState>,
    cvar: Condvar,
}

impl TurnToken {
    fn new(n_threads: usize) -> Self {
        TurnToken {
            n_threads,
            state: Mutex::new(TurnState {
                turn: 0,
                culprit: None,
            }),
            cvar: Condvar::new(),
        }
    }

    /// sleep until it's `thread_index`'s turn. Panics if a peer panicked
    fn acquire(&self, thread_index: usize) {
        let mut state = lock(&self.state);
        while state.turn != thread_index && state.culprit.is_none() {
            state = self.cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.culprit.is_some() {
            drop(state);
            panic!("a thread in this block panicked while holding the turn");
        }
    }

    /// hand the token to the next thread (wrapping around to thread 0)
    fn release(&self) {
        let mut state = lock(&self.state);
        state.turn = (state.turn + 1) % self.n_threads;
        self.cvar.notify_all();
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

/// Gives up the turn when the thread finishes the kernel (or poisons the
/// token if the thread unwinds)
struct TurnGuard<'b> {
    token: &'b TurnToken,
    thread_index: usize,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.token.poison(self.thread_index);
        } else {
            self.token.release();
        }
    }
}

/// The per-thread [`ExecutionContext`] of the lockstep backend
struct LockstepContext<'b, T, const BLOCK_SIZE: usize> {
    grid_index: usize,
    thread_index: usize,
    grid_size: usize,
    shared: &'b SharedBuffer<T, BLOCK_SIZE>,
    token: &'b TurnToken,
}

impl<T, const BLOCK_SIZE: usize> ExecutionContext<T, BLOCK_SIZE>
    for LockstepContext<'_, T, BLOCK_SIZE>
{
    fn grid_index(&self) -> usize {
        self.grid_index
    }

    fn thread_index(&self) -> usize {
        self.thread_index
    }

    fn grid_size(&self) -> usize {
        self.grid_size
    }

    fn alloc_shared(&self) -> &SharedBuffer<T, BLOCK_SIZE> {
        self.shared
    }

    fn barrier(&self) {
        // since the token travels in order of thread_index, it only comes
        // back to us once every other thread has reached this barrier
        self.token.release();
        self.token.acquire(self.thread_index);
    }
}

/// Executes the grid one block at a time, and the threads of a block one at
/// a time.
///
/// The output is bitwise identical to the output of
/// [`ThreadedExecutor`](crate::ThreadedExecutor) (both execute the same fixed
/// reduction schedule), but the execution itself is also reproducible.
#[derive(Default)]
pub struct LockstepExecutor {
    stack_size: Option<usize>,
}

impl LockstepExecutor {
    /// Sets the stack size (in bytes) of every thread that gets launched.
    ///
    /// By default, threads get the platform's default stack size.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

/// executes all threads of block `grid_index`
#[allow(clippy::too_many_arguments)]
fn run_block<T, F, const BLOCK_SIZE: usize>(
    kernel: &ReduceKernel<BLOCK_SIZE, F>,
    source: ArrayView1<T>,
    cells: &[OutputCell<T>],
    n: usize,
    grid_size: usize,
    grid_index: usize,
    shared: &SharedBuffer<T, BLOCK_SIZE>,
    stack_size: Option<usize>,
) -> Result<(), Error>
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    let token = TurnToken::new(BLOCK_SIZE);

    let (all_joined, spawn_failure) = std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(BLOCK_SIZE);
        let mut spawn_failure = None;
        for thread_index in 0..BLOCK_SIZE {
            let ctx = LockstepContext {
                grid_index,
                thread_index,
                grid_size,
                shared,
                token: &token,
            };
            let spawned = spawn_worker(scope, stack_size, move || {
                let _guard = TurnGuard {
                    token: ctx.token,
                    thread_index,
                };
                ctx.token.acquire(thread_index);
                kernel.call(&ctx, source, cells, n);
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // the turn would eventually pass to the missing thread
                    token.poison(thread_index);
                    spawn_failure = Some((thread_index, err));
                    break;
                }
            }
        }
        let all_joined = handles
            .into_iter()
            .map(|handle| handle.join().is_ok())
            .fold(true, |acc, ok| acc && ok);
        (all_joined, spawn_failure)
    });

    if let Some((thread_index, err)) = spawn_failure {
        warn!("couldn't spawn thread {thread_index} of block {grid_index}: {err}");
        return Err(Error::thread_spawn(grid_index, thread_index, err));
    }
    if all_joined {
        Ok(())
    } else {
        let thread_index = token.culprit().unwrap_or(0);
        warn!("thread {thread_index} of block {grid_index} panicked during a reduction");
        Err(Error::worker_panicked(grid_index, thread_index))
    }
}

impl Executor for LockstepExecutor {
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
        debug!("lockstep reduction: n = {n}, {grid_size} blocks of {BLOCK_SIZE} threads");

        let cells = alloc_output_cells(grid_size);
        // blocks run one at a time, so they can all share 1 buffer
        let mut shared: SharedBuffer<T, BLOCK_SIZE> = SharedBuffer::new();
        for grid_index in 0..grid_size {
            trace!("launching block {grid_index}");
            shared.reset();
            run_block(
                kernel,
                source,
                &cells,
                n,
                grid_size,
                grid_index,
                &shared,
                self.stack_size,
            )?;
        }

        let n_written = copy_out(cells, destination);
        debug!("{n_written} of {grid_size} blocks produced a partial result");
        Ok(())
    }
}

use crate::config::LaunchParam;
use crate::error::Error;
use blockreduce_nostd_internal::{OutputCell, ReduceKernel};
use ndarray::{ArrayView1, ArrayViewMut1};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{Builder, Scope, ScopedJoinHandle};

/// a trait for expressing how to launch a reduction kernel
///
/// We implement this for each "backend," so that we have a uniform interface
/// for switching between them. An implementation plays the role of the
/// accelerator runtime: it creates a block's threads, hands each thread an
/// [`ExecutionContext`](blockreduce_nostd_internal::ExecutionContext), and
/// provides the shared buffer and the barrier.
///
/// Implementations check the launch before any thread starts. After a
/// successful call, `destination[b]` holds block `b`'s partial result for
/// every block that owned at least one element. The other entries of
/// `destination` are left untouched.
pub trait Executor {
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
        F: Fn(T, T) -> T + Sync;
}

/// Checks the preconditions of a launch.
///
/// The kernel has no way to report problems, so this is the only place
/// where we catch mistakes with the problem size and the array lengths.
pub(crate) fn check_launch(
    source_len: usize,
    destination_len: usize,
    n: usize,
    launch: &LaunchParam,
    block_size: usize,
) -> Result<(), Error> {
    if n > source_len {
        return Err(Error::source_length(n, source_len));
    }
    if destination_len < launch.grid_size() {
        return Err(Error::destination_length(launch.grid_size(), destination_len));
    }
    // we don't need the value, we just need to know that it doesn't overflow
    launch.total_threads(block_size)?;
    Ok(())
}

/// allocate the "device-side" destination array (1 cell per block)
pub(crate) fn alloc_output_cells<T>(grid_size: usize) -> Vec<OutputCell<T>> {
    (0..grid_size).map(|_| OutputCell::new()).collect()
}

/// Copies the values written by the kernel into `destination`. Returns the
/// number of blocks that wrote a value.
pub(crate) fn copy_out<T>(cells: Vec<OutputCell<T>>, destination: &mut ArrayViewMut1<T>) -> usize {
    let mut n_written = 0;
    for (cell, dst) in cells.into_iter().zip(destination.iter_mut()) {
        if let Some(value) = cell.into_inner() {
            *dst = value;
            n_written += 1;
        }
    }
    n_written
}

/// lock `mutex`, even if another thread panicked while holding it
///
/// the data behind the executors' mutexes remains consistent across a panic
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts one kernel thread inside `scope`.
///
/// Unlike [`Scope::spawn`], this returns an error when the OS refuses to
/// create the thread. The caller is responsible for releasing any peers that
/// were already started (they would otherwise wait on the missing thread).
pub(crate) fn spawn_worker<'scope, 'env, F>(
    scope: &'scope Scope<'scope, 'env>,
    stack_size: Option<usize>,
    f: F,
) -> std::io::Result<ScopedJoinHandle<'scope, ()>>
where
    F: FnOnce() + Send + 'scope,
{
    let builder = match stack_size {
        Some(bytes) => Builder::new().stack_size(bytes),
        None => Builder::new(),
    };
    builder.spawn_scoped(scope, f)
}

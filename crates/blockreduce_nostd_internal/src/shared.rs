//! Memory that is written by one thread and read by others
//!
//! On a GPU, both of the types defined here would correspond to plain memory
//! (block-shared memory and global memory). The hardware doesn't prevent data
//! races; program order and barriers do. We mirror that here: the write and
//! read methods are `unsafe` and the safety contract is the same
//! index-partitioning discipline that a CUDA kernel author relies upon.
//!
//! Unlike real shared memory, a slot that was never written reads as `None`
//! (rather than as garbage).

use core::cell::UnsafeCell;

/// A fixed-capacity scratch buffer shared by the `N` threads of a block.
///
/// # Note
/// We store `Option<T>` rather than `core::mem::MaybeUninit<T>`. It costs a
/// discriminant per slot, but it means that a logic error in a guard
/// produces a missing value instead of undefined behavior.
pub struct SharedBuffer<T, const N: usize> {
    slots: [UnsafeCell<Option<T>>; N],
}

// SAFETY: all access to the interior goes through `store` and `load`, whose
// callers promise that a slot is never written while another thread
// accesses the same slot.
unsafe impl<T: Send + Sync, const N: usize> Sync for SharedBuffer<T, N> {}

impl<T, const N: usize> SharedBuffer<T, N> {
    pub fn new() -> Self {
        const { assert!(N > 0, "a SharedBuffer can't have a capacity of 0") };
        Self {
            slots: core::array::from_fn(|_| UnsafeCell::new(None)),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Writes `value` into slot `i`. Out-of-range indices are ignored.
    ///
    /// # Safety
    /// No other thread may read or write slot `i` until the writing thread
    /// and the other thread have both passed a common barrier.
    #[inline(always)]
    pub unsafe fn store(&self, i: usize, value: T) {
        if let Some(slot) = self.slots.get(i) {
            // SAFETY: the caller guarantees exclusive access to slot `i`
            unsafe { *slot.get() = Some(value) };
        }
    }

    /// Reads slot `i`. Returns `None` for an unwritten or out-of-range slot.
    ///
    /// # Safety
    /// No other thread may be writing slot `i` (i.e. the write must be
    /// separated from this read by a barrier, or done by this thread).
    #[inline(always)]
    pub unsafe fn load(&self, i: usize) -> Option<T>
    where
        T: Copy,
    {
        // SAFETY: the caller guarantees that nobody is writing slot `i`
        self.slots.get(i).and_then(|slot| unsafe { *slot.get() })
    }

    /// Marks every slot as unwritten. This is how a block-scoped buffer gets
    /// recycled by a block that executes after it.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot.get_mut() = None;
        }
    }
}

impl<T, const N: usize> Default for SharedBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry of the destination array that the kernel writes block results
/// into.
///
/// Each cell is written at most once (by thread 0 of the block whose index
/// matches the cell's index). Cells that are never written stay `None`, which
/// lets the host copy back only the entries that a block actually produced.
pub struct OutputCell<T>(UnsafeCell<Option<T>>);

// SAFETY: a cell is only written through `store`, whose callers promise
// there's a single writer and no concurrent reader
unsafe impl<T: Send> Sync for OutputCell<T> {}

impl<T> OutputCell<T> {
    pub const fn new() -> Self {
        OutputCell(UnsafeCell::new(None))
    }

    /// # Safety
    /// At most one thread may call this for a given cell over the course of a
    /// launch, and nothing may read the cell until the launch completes.
    #[inline(always)]
    pub unsafe fn store(&self, value: T) {
        // SAFETY: the caller guarantees that this is the only access
        unsafe { *self.0.get() = Some(value) };
    }

    pub fn is_written(&mut self) -> bool {
        self.0.get_mut().is_some()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0.into_inner()
    }
}

impl<T> Default for OutputCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

use crate::error::Error;
use std::num::NonZeroU32;

/// Describes how a reduction is distributed across blocks.
///
/// The number of threads per block isn't stored here. It's a compile-time
/// property of the kernel (the `BLOCK_SIZE` parameter of
/// [`ReduceKernel`](crate::ReduceKernel)).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchParam {
    grid_size: NonZeroU32,
}

impl LaunchParam {
    pub fn new(grid_size: NonZeroU32) -> Self {
        LaunchParam { grid_size }
    }

    /// Fallible constructor for when the grid size comes from an arbitrary
    /// integer
    pub fn from_grid_size(grid_size: u64) -> Result<Self, Error> {
        u32::try_from(grid_size)
            .ok()
            .and_then(NonZeroU32::new)
            .map(LaunchParam::new)
            .ok_or_else(|| Error::integer_range("grid_size", grid_size, 1, u32::MAX as u64))
    }

    /// Picks enough blocks of `block_size` threads to give every thread at
    /// least one element of a problem with `n` elements, while launching no
    /// more than `max_blocks` blocks.
    ///
    /// When the grid is capped, each thread handles several elements (thanks
    /// to the grid-stride loop). We always launch at least 1 block.
    pub fn covering(n: usize, block_size: usize, max_blocks: NonZeroU32) -> Self {
        let wanted = n.div_ceil(block_size.max(1));
        let grid_size = wanted.clamp(1, max_blocks.get() as usize) as u32;
        // grid_size lies between 1 and max_blocks
        LaunchParam {
            grid_size: NonZeroU32::new(grid_size).unwrap_or(max_blocks),
        }
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size.get() as usize
    }

    /// the total number of threads in the grid (this is the grid-stride)
    pub(crate) fn total_threads(&self, block_size: usize) -> Result<usize, Error> {
        self.grid_size().checked_mul(block_size).ok_or_else(|| {
            Error::integer_range(
                "grid_size * block_size",
                (self.grid_size() as u64).saturating_mul(block_size as u64),
                1,
                usize::MAX as u64,
            )
        })
    }
}

use core::iter::FusedIterator;
use ndarray::{ArrayView1, IndexLonger};

/// counts the members of `start, start + stride, ...` that are less than `end`
fn n_positions(start: usize, stride: usize, end: usize) -> usize {
    if start >= end {
        0
    } else if stride == 0 {
        // a zero-stride would otherwise revisit `start` forever
        1
    } else {
        (end - start - 1) / stride + 1
    }
}

/// The subsequence of a source array that is owned by a single thread in a
/// grid-stride loop.
///
/// The range visits positions `start, start + stride, start + 2*stride, ...`
/// and stops at the first position that reaches `end`. In the reduction
/// kernel, `start` is the thread's global index and `stride` is the total
/// number of threads in the grid.
///
/// This plays the role that raw pointer arithmetic plays in a CUDA kernel,
/// but every access is bounds-checked: dereferencing an exhausted range
/// gives `None` and advancing past the end just leaves the range exhausted.
///
/// The range is lazy and restartable: clone it to remember a position.
#[derive(Clone)]
pub struct StridedRange<'a, T> {
    source: ArrayView1<'a, T>,
    position: usize,
    stride: usize,
    end: usize,
    remaining: usize,
}

impl<'a, T> StridedRange<'a, T> {
    /// Construct the range. `end` is clamped to the length of `source`.
    pub fn new(source: ArrayView1<'a, T>, start: usize, stride: usize, end: usize) -> Self {
        let end = end.min(source.len());
        StridedRange {
            source,
            position: start,
            stride,
            end,
            remaining: n_positions(start, stride, end),
        }
    }

    /// the linear index (into the source) of the current element
    pub fn position(&self) -> usize {
        self.position
    }

    /// the exclusive upper bound on positions (the end sentinel)
    pub fn end(&self) -> usize {
        self.end
    }

    /// number of elements left in the range
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// `true` once the current position has reached the end sentinel
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// the current element
    pub fn get(&self) -> Option<&'a T> {
        self.peek(0)
    }

    /// the element `k` positions after the current one
    pub fn peek(&self, k: usize) -> Option<&'a T> {
        if k < self.remaining {
            IndexLonger::get(&self.source, self.position + k * self.stride)
        } else {
            None
        }
    }

    /// Moves the range forward by `k` positions. Never wraps around.
    pub fn advance_by(&mut self, k: usize) {
        self.remaining -= k.min(self.remaining);
        self.position = self.position.saturating_add(k.saturating_mul(self.stride));
    }

    /// Takes the next 4 elements at once.
    ///
    /// When fewer than 4 elements remain, this returns `None` and the range
    /// isn't modified.
    #[inline(always)]
    pub fn next_chunk4(&mut self) -> Option<[T; 4]>
    where
        T: Copy,
    {
        if self.remaining < 4 {
            return None;
        }
        match (self.peek(0), self.peek(1), self.peek(2), self.peek(3)) {
            (Some(&e0), Some(&e1), Some(&e2), Some(&e3)) => {
                self.advance_by(4);
                Some([e0, e1, e2, e3])
            }
            _ => None,
        }
    }
}

impl<'a, T> Iterator for StridedRange<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let out = self.get()?;
        self.advance_by(1);
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn nth(&mut self, n: usize) -> Option<&'a T> {
        self.advance_by(n);
        self.next()
    }
}

impl<T> ExactSizeIterator for StridedRange<'_, T> {}

impl<T> FusedIterator for StridedRange<'_, T> {}

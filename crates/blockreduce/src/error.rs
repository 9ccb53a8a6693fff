// Errors are only produced on the host side. The kernel itself has no error
// path: once we've validated the launch, the kernel's guards keep every
// access in bounds.
//
// We follow the usual pattern of exposing a single opaque Error type that
// wraps a private ErrorKind enum. This lets us add new kinds of errors (or
// attach more context to existing ones) without breaking anybody.

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// The underlying internal error type
#[non_exhaustive]
#[derive(Debug)]
enum ErrorKind {
    /// An error that occurs when the source array holds fewer than `n`
    /// elements
    SourceLength(SourceLengthError),
    /// An error that occurs when the destination array doesn't have an entry
    /// for every block
    DestinationLength(DestinationLengthError),
    /// An error that occurs when an integer lies outside of the acceptable
    /// range of values
    IntegerRange(IntegerRangeError),
    /// An error that occurs when a thread panics while executing the kernel
    WorkerPanicked(WorkerPanickedError),
    /// An error that occurs when the OS refuses to create a thread
    ThreadSpawn(ThreadSpawnError),
}

// define constructor methods for Error
impl Error {
    /// produce an error indicating that the source array is too short
    pub(crate) fn source_length(n: usize, actual_len: usize) -> Self {
        Error {
            kind: ErrorKind::SourceLength(SourceLengthError { n, actual_len }),
        }
    }

    /// produce an error indicating that the destination array is too short
    pub(crate) fn destination_length(grid_size: usize, actual_len: usize) -> Self {
        Error {
            kind: ErrorKind::DestinationLength(DestinationLengthError {
                grid_size,
                actual_len,
            }),
        }
    }

    /// produce an error indicating that an integer lies outside the acceptable
    /// range of values
    pub(crate) fn integer_range(
        description: &'static str,
        actual: u64,
        min_val: u64,
        max_val: u64,
    ) -> Self {
        Error {
            kind: ErrorKind::IntegerRange(IntegerRangeError {
                description,
                actual,
                min_val,
                max_val,
            }),
        }
    }

    /// produce an error indicating that a worker thread panicked
    pub(crate) fn worker_panicked(block_index: usize, thread_index: usize) -> Self {
        Error {
            kind: ErrorKind::WorkerPanicked(WorkerPanickedError {
                block_index,
                thread_index,
            }),
        }
    }

    /// produce an error indicating that a thread of the launch couldn't be
    /// created
    pub(crate) fn thread_spawn(
        block_index: usize,
        thread_index: usize,
        source: std::io::Error,
    ) -> Self {
        Error {
            kind: ErrorKind::ThreadSpawn(ThreadSpawnError {
                block_index,
                thread_index,
                source,
            }),
        }
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for ErrorKind {}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            ErrorKind::SourceLength(ref err) => err.fmt(f),
            ErrorKind::DestinationLength(ref err) => err.fmt(f),
            ErrorKind::IntegerRange(ref err) => err.fmt(f),
            ErrorKind::WorkerPanicked(ref err) => err.fmt(f),
            ErrorKind::ThreadSpawn(ref err) => err.fmt(f),
        }
    }
}

/// An error that occurs when the source array holds fewer than `n` elements
#[derive(Clone, Debug)]
struct SourceLengthError {
    n: usize,
    actual_len: usize,
}

impl std::error::Error for SourceLengthError {}

impl core::fmt::Display for SourceLengthError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "the problem size is {}, but the source only holds {} elements",
            self.n, self.actual_len
        )
    }
}

/// An error that occurs when the destination array doesn't have an entry
/// for every block
#[derive(Clone, Debug)]
struct DestinationLengthError {
    grid_size: usize,
    actual_len: usize,
}

impl std::error::Error for DestinationLengthError {}

impl core::fmt::Display for DestinationLengthError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let DestinationLengthError {
            grid_size,
            actual_len,
        } = self;
        write!(
            f,
            "the destination holds {actual_len} elements. It needs at least \
             {grid_size} elements (1 per block)"
        )
    }
}

/// An error that occurs when an integer lies outside of the acceptable
/// range of values
#[derive(Clone, Debug)]
struct IntegerRangeError {
    description: &'static str,
    actual: u64,
    min_val: u64,
    max_val: u64,
}

impl std::error::Error for IntegerRangeError {}

impl core::fmt::Display for IntegerRangeError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "{} has a value of {}. The value should be no less than {} and \
             not exceed {}",
            self.description, self.actual, self.min_val, self.max_val
        )
    }
}

/// An error that occurs when a thread panics while executing the kernel
///
/// In practice, this means that the reduction functor panicked.
#[derive(Clone, Debug)]
struct WorkerPanickedError {
    block_index: usize,
    thread_index: usize,
}

impl std::error::Error for WorkerPanickedError {}

impl core::fmt::Display for WorkerPanickedError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "thread {} of block {} panicked while executing the kernel",
            self.thread_index, self.block_index
        )
    }
}

/// An error that occurs when the OS refuses to create a thread
#[derive(Debug)]
struct ThreadSpawnError {
    block_index: usize,
    thread_index: usize,
    source: std::io::Error,
}

impl std::error::Error for ThreadSpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl core::fmt::Display for ThreadSpawnError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(
            f,
            "failed to spawn thread {} of block {}: {}",
            self.thread_index, self.block_index, self.source
        )
    }
}

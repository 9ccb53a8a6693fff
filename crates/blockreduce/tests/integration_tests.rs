use blockreduce::{Executor, LockstepExecutor, ReduceKernel, ThreadedExecutor, ops};
use ndarray::{Array1, ArrayView1};
use std::num::NonZeroU32;

mod common;

use common::{launch, run_reduce, sequential_fold};

// a sentinel that none of the tests can produce as a legitimate result
const UNWRITTEN: i64 = i64::MIN;

fn threaded() -> ThreadedExecutor {
    ThreadedExecutor::new(NonZeroU32::new(2).unwrap())
}

fn lockstep() -> LockstepExecutor {
    LockstepExecutor::default()
}

#[test]
fn single_block_ragged() {
    let source = [1_i64, 2, 3, 4, 5];
    let kernel = ReduceKernel::<8, _>::new(ops::add::<i64>);

    let out = run_reduce(&mut lockstep(), &kernel, &source, 5, 1, UNWRITTEN).unwrap();
    assert_eq!(out.as_slice().unwrap(), [15]);

    let out = run_reduce(&mut threaded(), &kernel, &source, 5, 1, UNWRITTEN).unwrap();
    assert_eq!(out.as_slice().unwrap(), [15]);
}

#[test]
fn two_blocks_grid_stride() {
    let source: Vec<i64> = (1..=10).collect();
    let kernel = ReduceKernel::<4, _>::new(ops::add::<i64>);

    let out = run_reduce(&mut lockstep(), &kernel, &source, 10, 2, UNWRITTEN).unwrap();
    // the grid has 8 threads. Block 0 owns global indices {0,1,2,3,8,9} and
    // block 1 owns {4,5,6,7}
    assert_eq!(out[0], 1 + 2 + 3 + 4 + 9 + 10);
    assert_eq!(out[1], 5 + 6 + 7 + 8);
    assert_eq!(out.sum(), 55);

    let threaded_out = run_reduce(&mut threaded(), &kernel, &source, 10, 2, UNWRITTEN).unwrap();
    assert_eq!(threaded_out, out);
}

#[test]
fn non_power_of_two_block_max() {
    let source = [3.5_f64, -1.0, 12.25, 7.0, 0.5, 9.75];
    let kernel = ReduceKernel::<6, _>::new(ops::max::<f64>);

    let out = run_reduce(&mut lockstep(), &kernel, &source, 6, 1, f64::NAN).unwrap();
    assert_eq!(out[0], 12.25);

    // the maximum at every possible position
    for position in 0..6 {
        let mut source = [1.0_f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        source.swap(position, 5);
        let out = run_reduce(&mut threaded(), &kernel, &source, 6, 1, f64::NAN).unwrap();
        assert_eq!(out[0], 6.0, "maximum stored at index {position}");
    }
}

#[test]
fn zero_problem_size() {
    let source = [1_i64, 2, 3];
    let kernel = ReduceKernel::<4, _>::new(ops::add::<i64>);

    let out = run_reduce(&mut lockstep(), &kernel, &source, 0, 3, UNWRITTEN).unwrap();
    assert!(out.iter().all(|&v| v == UNWRITTEN));

    let out = run_reduce(&mut threaded(), &kernel, &source, 0, 3, UNWRITTEN).unwrap();
    assert!(out.iter().all(|&v| v == UNWRITTEN));
}

#[test]
fn empty_blocks_left_untouched() {
    // 3 blocks of 4 threads, but only 6 elements: block 2 owns nothing
    let source: Vec<i64> = (1..=6).collect();
    let kernel = ReduceKernel::<4, _>::new(ops::add::<i64>);

    for out in [
        run_reduce(&mut lockstep(), &kernel, &source, 6, 3, UNWRITTEN).unwrap(),
        run_reduce(&mut threaded(), &kernel, &source, 6, 3, UNWRITTEN).unwrap(),
    ] {
        assert_eq!(out[0], 1 + 2 + 3 + 4);
        assert_eq!(out[1], 5 + 6);
        assert_eq!(out[2], UNWRITTEN);
    }
}

#[test]
fn only_leading_part_of_source() {
    // entries beyond n must be ignored
    let source = [1_i64, 1, 1, 1, 1000, 1000];
    let kernel = ReduceKernel::<3, _>::new(ops::add::<i64>);
    let out = run_reduce(&mut lockstep(), &kernel, &source, 4, 1, UNWRITTEN).unwrap();
    assert_eq!(out[0], 4);
}

#[test]
fn single_thread_block() {
    let source: Vec<i64> = (0..37).collect();
    let kernel = ReduceKernel::<1, _>::new(ops::add::<i64>);
    let out = run_reduce(&mut threaded(), &kernel, &source, 37, 5, UNWRITTEN).unwrap();
    assert_eq!(out.sum(), (0..37).sum::<i64>());
}

/// concatenates the decimal digits of `a` and `b`. This is associative, but
/// not commutative
fn concat(a: u64, b: u64) -> u64 {
    let mut scale = 10;
    while scale <= b {
        scale *= 10;
    }
    a * scale + b
}

#[test]
fn non_commutative_matches_partition() {
    // Each thread folds its grid-stride subsequence in order, so with 1 block
    // of 1 thread we recover the sequential fold
    let source = [1_u64, 2, 3, 4, 5, 6, 7];
    let kernel = ReduceKernel::<1, _>::new(concat);
    let out = run_reduce(&mut lockstep(), &kernel, &source, 7, 1, 0).unwrap();
    assert_eq!(out[0], sequential_fold(&source, concat).unwrap());
    assert_eq!(out[0], 1234567);

    // with 2 threads, thread 0 owns {1,3,5,7} and thread 1 owns {2,4,6}
    let kernel = ReduceKernel::<2, _>::new(concat);
    let out = run_reduce(&mut lockstep(), &kernel, &source, 7, 1, 0).unwrap();
    assert_eq!(out[0], 1357246);
}

#[test]
fn short_source_is_an_error() {
    let source = [1_i64, 2, 3];
    let kernel = ReduceKernel::<4, _>::new(ops::add::<i64>);
    let expected = "the problem size is 4, but the source only holds 3 elements";

    let err = run_reduce(&mut lockstep(), &kernel, &source, 4, 1, 0).unwrap_err();
    assert_eq!(err.to_string(), expected);
    let err = run_reduce(&mut threaded(), &kernel, &source, 4, 1, 0).unwrap_err();
    assert_eq!(err.to_string(), expected);
}

#[test]
fn short_destination_is_an_error() {
    let source = [1_i64, 2, 3];
    let kernel = ReduceKernel::<4, _>::new(ops::add::<i64>);
    let mut destination = Array1::from_elem(1, UNWRITTEN);
    let err = lockstep()
        .drive_reduce(
            &kernel,
            ArrayView1::from(&source[..]),
            &mut destination.view_mut(),
            3,
            &launch(2),
        )
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "the destination holds 1 elements. It needs at least 2 elements (1 per block)"
    );
    // nothing is written when the launch is rejected
    assert_eq!(destination[0], UNWRITTEN);
}

#[test]
fn longer_destination_is_fine() {
    let source = [2_i64, 4, 6];
    let kernel = ReduceKernel::<2, _>::new(ops::add::<i64>);
    let mut destination = Array1::from_elem(3, UNWRITTEN);
    threaded()
        .drive_reduce(
            &kernel,
            ArrayView1::from(&source[..]),
            &mut destination.view_mut(),
            3,
            &launch(1),
        )
        .unwrap();
    assert_eq!(destination.as_slice().unwrap(), [12, UNWRITTEN, UNWRITTEN]);
}

#[test]
fn panicking_functor_is_reported() {
    let source: Vec<i64> = (0..16).collect();
    // 13 is owned by thread 1 of block 1, which combines it with 5
    let kernel = ReduceKernel::<4, _>::new(|a: i64, b: i64| {
        if b == 13 {
            panic!("unlucky number");
        }
        a + b
    });
    let expected = "thread 1 of block 1 panicked while executing the kernel";

    let mut destination = Array1::from_elem(2, UNWRITTEN);
    let err = lockstep()
        .drive_reduce(
            &kernel,
            ArrayView1::from(&source[..]),
            &mut destination.view_mut(),
            16,
            &launch(2),
        )
        .unwrap_err();
    assert_eq!(err.to_string(), expected);
    // block 0 finished, but a failed launch doesn't copy anything out
    assert_eq!(destination.as_slice().unwrap(), [UNWRITTEN, UNWRITTEN]);

    let mut destination = Array1::from_elem(2, UNWRITTEN);
    let err = threaded()
        .drive_reduce(
            &kernel,
            ArrayView1::from(&source[..]),
            &mut destination.view_mut(),
            16,
            &launch(2),
        )
        .unwrap_err();
    assert_eq!(err.to_string(), expected);
    assert_eq!(destination.as_slice().unwrap(), [UNWRITTEN, UNWRITTEN]);
}

// no address space can hold a stack this large, so the OS refuses to create
// the thread
#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
const UNMAPPABLE_STACK: usize = 1 << 60;

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
#[test]
fn thread_creation_failure_is_reported() {
    let source: Vec<i64> = (0..64).collect();
    let kernel = ReduceKernel::<8, _>::new(ops::add::<i64>);

    let mut executor = threaded().with_stack_size(UNMAPPABLE_STACK);
    let mut destination = Array1::from_elem(4, UNWRITTEN);
    let err = executor
        .drive_reduce(
            &kernel,
            ArrayView1::from(&source[..]),
            &mut destination.view_mut(),
            64,
            &launch(4),
        )
        .unwrap_err();
    assert!(
        err.to_string().starts_with("failed to spawn thread 0 of block 0: "),
        "unexpected message: {err}"
    );
    assert!(destination.iter().all(|v| *v == UNWRITTEN));

    let mut executor = lockstep().with_stack_size(UNMAPPABLE_STACK);
    let err = run_reduce(&mut executor, &kernel, &source, 64, 4, UNWRITTEN).unwrap_err();
    assert!(
        err.to_string().starts_with("failed to spawn thread 0 of block 0: "),
        "unexpected message: {err}"
    );

    // the executors stay usable with a sensible stack size
    let mut executor = threaded().with_stack_size(1 << 20);
    let out = run_reduce(&mut executor, &kernel, &source, 64, 4, UNWRITTEN).unwrap();
    assert_eq!(out.sum(), (0..64).sum::<i64>());
}

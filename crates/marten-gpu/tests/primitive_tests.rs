// Primitive Tests — End-to-end behavior of every operation dispatcher
//
// All tests run on the software device, which executes the real kernel ABI
// on host buffers, so view/copy decisions, argument packing, and geometry
// are all exercised.

use marten_core::{Allocator, Array, DType, Error, HostAllocator, Shape};
use marten_gpu::{
    Arange, ArgReduce, ArgReduceKind, AsType, Concatenate, Conjugate, Full, Pad, RandomBits,
    Reshape, SimDevice, Slice, SliceUpdate, Stream, Svd,
};

const S: Stream = Stream(0);

// ─────────────────────────────────────────────────────────────────────────
// Arange
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_arange_basic() {
    let dev = SimDevice::new();
    let mut out = Array::placeholder(5usize, DType::I32);
    Arange::new(0.0, 1.0, S).eval(&[], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_arange_float_step() {
    let dev = SimDevice::new();
    let mut out = Array::placeholder(4usize, DType::F32);
    Arange::new(1.0, 0.5, S).eval(&[], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0, 1.5, 2.0, 2.5]);
}

#[test]
fn test_arange_integer_step_truncation() {
    // start 0.5 / step 0.5 both truncate in i32: effective start 0, step 1.
    let dev = SimDevice::new();
    let mut out = Array::placeholder(3usize, DType::I32);
    Arange::new(0.5, 0.5, S).eval(&[], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 2]);
}

#[test]
fn test_arange_unsupported_dtype_fails_before_alloc() {
    let alloc = HostAllocator::new(1 << 20);
    let dev = SimDevice::with_allocator(alloc.clone());
    let mut out = Array::placeholder(5usize, DType::Bool);
    let err = Arange::new(0.0, 1.0, S).eval(&[], &mut out, &dev);
    assert!(matches!(err, Err(Error::UnsupportedDType { .. })));
    assert_eq!(alloc.stats().in_use, 0);
    assert_eq!(alloc.stats().peak, 0);
}

#[test]
fn test_arange_empty() {
    let dev = SimDevice::new();
    let mut out = Array::placeholder(0usize, DType::F32);
    Arange::new(0.0, 1.0, S).eval(&[], &mut out, &dev).unwrap();
    assert!(out.has_data());
    assert!(dev.launches().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────
// ArgReduce
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_argmax_rows() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32, 3.0, 2.0, 9.0, 0.0, 8.0], (2, 3)).unwrap();
    let mut out = Array::placeholder(2usize, DType::U32);
    ArgReduce::new(ArgReduceKind::ArgMax, 1, S)
        .eval(&[input], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<u32>().unwrap(), vec![1, 0]);
}

#[test]
fn test_argmax_ties_take_first_index() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![9.0f32, 0.0, 9.0, 9.0], 4usize).unwrap();
    let mut out = Array::placeholder((), DType::U32);
    ArgReduce::new(ArgReduceKind::ArgMax, 0, S)
        .eval(&[input], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<u32>().unwrap(), vec![0]);
}

#[test]
fn test_argmin_columns() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i64, 3, 2, 9, 0, 9], (2, 3)).unwrap();
    let mut out = Array::placeholder(3usize, DType::U32);
    ArgReduce::new(ArgReduceKind::ArgMin, 0, S)
        .eval(&[input], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<u32>().unwrap(), vec![0, 1, 0]);
}

#[test]
fn test_argmax_transposed_input() {
    // Strided input: argmax over the rows of a transposed matrix.
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32, 9.0, 4.0, 2.0, 0.0, 3.0], (2, 3)).unwrap();
    let t = input.transpose(0, 1).unwrap(); // [[1,2],[9,0],[4,3]]
    let mut out = Array::placeholder(3usize, DType::U32);
    ArgReduce::new(ArgReduceKind::ArgMax, 1, S)
        .eval(&[t], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<u32>().unwrap(), vec![1, 0, 0]);
}

#[test]
fn test_argmax_matches_host_reference() {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let dev = SimDevice::new();
    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<f32> = (0..64).map(|_| rng.gen_range(-100.0..100.0)).collect();
    let input = Array::from_vec(data.clone(), (8, 8)).unwrap();
    let mut out = Array::placeholder(8usize, DType::U32);
    ArgReduce::new(ArgReduceKind::ArgMax, 1, S)
        .eval(&[input], &mut out, &dev)
        .unwrap();
    let expected: Vec<u32> = data
        .chunks(8)
        .map(|row| {
            let mut best = 0usize;
            for (i, v) in row.iter().enumerate() {
                if *v > row[best] {
                    best = i;
                }
            }
            best as u32
        })
        .collect();
    assert_eq!(out.to_vec::<u32>().unwrap(), expected);
}

#[test]
fn test_argreduce_requires_u32_output() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32, 2.0], 2usize).unwrap();
    let mut out = Array::placeholder((), DType::I32);
    let err = ArgReduce::new(ArgReduceKind::ArgMax, 0, S).eval(&[input], &mut out, &dev);
    assert!(matches!(err, Err(Error::DTypeMismatch { .. })));
}

#[test]
fn test_argreduce_rejects_empty_axis() {
    // An empty axis has no extremum; this must be a precondition error,
    // not a launch.
    let dev = SimDevice::new();
    let input = Array::from_vec(Vec::<f32>::new(), (2, 0)).unwrap();
    let mut out = Array::placeholder(2usize, DType::U32);
    assert!(ArgReduce::new(ArgReduceKind::ArgMax, 1, S)
        .eval(&[input], &mut out, &dev)
        .is_err());
    assert!(dev.launches().is_empty());
}

#[test]
fn test_argreduce_axis_out_of_range() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32, 2.0], 2usize).unwrap();
    let mut out = Array::placeholder((), DType::U32);
    let err = ArgReduce::new(ArgReduceKind::ArgMax, 1, S).eval(&[input], &mut out, &dev);
    assert!(matches!(err, Err(Error::DimOutOfRange { dim: 1, rank: 1 })));
}

// ─────────────────────────────────────────────────────────────────────────
// Pad
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_pad_1d() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3], (1, 3)).unwrap();
    let fill = Array::scalar(0i32);
    let mut out = Array::placeholder((1, 5), DType::I32);
    Pad::new(vec![0, 1], vec![0, 1], S)
        .eval(&[input, fill], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 2, 3, 0]);
}

#[test]
fn test_pad_2d_with_fill_value() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32, 2.0, 3.0, 4.0], (2, 2)).unwrap();
    let fill = Array::scalar(-1.0f32);
    let mut out = Array::placeholder((4, 4), DType::F32);
    Pad::new(vec![0, 1], vec![1, 1], S)
        .eval(&[input, fill], &mut out, &dev)
        .unwrap();
    #[rustfmt::skip]
    let expected = vec![
        -1.0, -1.0, -1.0, -1.0,
        -1.0,  1.0,  2.0, -1.0,
        -1.0,  3.0,  4.0, -1.0,
        -1.0, -1.0, -1.0, -1.0,
    ];
    assert_eq!(out.to_vec::<f32>().unwrap(), expected);
}

#[test]
fn test_pad_negative_axis() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![5u8, 6], (1, 2)).unwrap();
    let fill = Array::scalar(0u8);
    let mut out = Array::placeholder((1, 4), DType::U8);
    // Axis -1 resolves to the last dimension.
    Pad::new(vec![-1], vec![2], S)
        .eval(&[input, fill], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<u8>().unwrap(), vec![0, 0, 5, 6]);
}

#[test]
fn test_pad_rejects_non_scalar_fill() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2], 2usize).unwrap();
    let fill = Array::from_vec(vec![0i32, 0], 2usize).unwrap();
    let mut out = Array::placeholder(4usize, DType::I32);
    assert!(Pad::new(vec![0], vec![1], S)
        .eval(&[input, fill], &mut out, &dev)
        .is_err());
}

// ─────────────────────────────────────────────────────────────────────────
// Slice
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_slice_is_a_view() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3, 4, 5], 5usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![1], vec![1], S)
        .unwrap()
        .eval(&[input.clone()], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![2, 3, 4]);
    assert!(out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
    assert!(dev.launches().is_empty());
}

#[test]
fn test_slice_with_step() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3, 4, 5, 6], 6usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![0], vec![2], S)
        .unwrap()
        .eval(&[input], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 3, 5]);
    assert_eq!(out.strides(), &[2]);
    assert!(!out.flags().contiguous);
}

#[test]
fn test_slice_2d_offset() {
    let dev = SimDevice::new();
    let input = Array::from_vec((0..12).collect::<Vec<i32>>(), (3, 4)).unwrap();
    let mut out = Array::placeholder((2, 2), DType::I32);
    Slice::new(vec![1, 1], vec![1, 2], S)
        .unwrap()
        .eval(&[input], &mut out, &dev)
        .unwrap();
    // Rows 1..3, columns 1 and 3.
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![5, 7, 9, 11]);
    assert_eq!(out.offset(), 5);
}

#[test]
fn test_slice_contiguous_output_copies() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3, 4, 5], 5usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![1], vec![1], S)
        .unwrap()
        .with_contiguous_output()
        .eval(&[input.clone()], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![2, 3, 4]);
    assert!(!out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
    assert!(out.flags().row_contiguous);
    assert_eq!(dev.launches().len(), 1);
}

#[test]
fn test_slice_rejects_zero_step() {
    assert!(Slice::new(vec![0], vec![0], S).is_err());
}

// ─────────────────────────────────────────────────────────────────────────
// SliceUpdate
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_slice_update_basic() {
    let dev = SimDevice::new();
    let base = Array::from_vec(vec![1i32, 2, 3, 4, 5], 5usize).unwrap();
    let update = Array::from_vec(vec![9i32, 9, 9], 3usize).unwrap();
    let mut out = Array::placeholder(5usize, DType::I32);
    SliceUpdate::new(vec![1], vec![1], S)
        .unwrap()
        .eval(&[base.clone(), update], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 9, 9, 9, 5]);
    // The base is materialized into fresh memory, never written in place.
    assert!(!out.buffer().unwrap().ptr_eq(base.buffer().unwrap()));
    assert_eq!(base.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_slice_update_with_step() {
    let dev = SimDevice::new();
    let base = Array::from_vec(vec![1i32, 2, 3, 4, 5], 5usize).unwrap();
    let update = Array::from_vec(vec![9i32, 9], 2usize).unwrap();
    let mut out = Array::placeholder(5usize, DType::I32);
    SliceUpdate::new(vec![0], vec![2], S)
        .unwrap()
        .eval(&[base, update], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![9, 2, 9, 4, 5]);
}

#[test]
fn test_slice_update_empty_update_aliases_base() {
    let dev = SimDevice::new();
    let base = Array::from_vec(vec![1i32, 2, 3], 3usize).unwrap();
    let update = Array::from_vec(Vec::<i32>::new(), 0usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    SliceUpdate::new(vec![0], vec![1], S)
        .unwrap()
        .eval(&[base.clone(), update], &mut out, &dev)
        .unwrap();
    assert!(out.buffer().unwrap().ptr_eq(base.buffer().unwrap()));
    assert!(dev.launches().is_empty());
}

#[test]
fn test_slice_update_col_contiguous_base_keeps_layout() {
    // A transposed 2x2 base is column-contiguous: the vector copy that
    // materializes it hands the output the base's strides, and the region
    // update must land correctly through those strides.
    let dev = SimDevice::new();
    let base = Array::from_vec(vec![1i32, 2, 3, 4], (2, 2)).unwrap();
    let t = base.transpose(0, 1).unwrap(); // [[1,3],[2,4]]
    let update = Array::from_vec(vec![9i32], (1, 1)).unwrap();
    let mut out = Array::placeholder((2, 2), DType::I32);
    SliceUpdate::new(vec![0, 0], vec![1, 1], S)
        .unwrap()
        .eval(&[t, update], &mut out, &dev)
        .unwrap();
    assert!(out.flags().col_contiguous);
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![9, 3, 2, 4]);
}

#[test]
fn test_slice_update_non_contiguous_base() {
    // A step-2 sliced base is not contiguous in any order and goes through
    // the general materialization path.
    let dev = SimDevice::new();
    let full = Array::from_vec(vec![1i32, 2, 3, 4, 5, 6], 6usize).unwrap();
    let mut base = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![0], vec![2], S)
        .unwrap()
        .eval(&[full], &mut base, &dev)
        .unwrap(); // [1, 3, 5]
    let update = Array::from_vec(vec![9i32], 1usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    SliceUpdate::new(vec![1], vec![1], S)
        .unwrap()
        .eval(&[base, update], &mut out, &dev)
        .unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 9, 5]);
}

// ─────────────────────────────────────────────────────────────────────────
// Concatenate
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_concatenate_axis0() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 2], 2usize).unwrap();
    let b = Array::from_vec(vec![3i32, 4, 5], 3usize).unwrap();
    let mut out = Array::placeholder(5usize, DType::I32);
    Concatenate::new(0, S).eval(&[a, b], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_concatenate_axis1() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 4], (2, 1)).unwrap();
    let b = Array::from_vec(vec![2i32, 3, 5, 6], (2, 2)).unwrap();
    let mut out = Array::placeholder((2, 3), DType::I32);
    Concatenate::new(1, S).eval(&[a, b], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_concatenate_strided_input() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 3, 2, 4], (2, 2)).unwrap();
    let t = a.transpose(0, 1).unwrap(); // [[1,2],[3,4]]
    let b = Array::from_vec(vec![5i32, 6], (1, 2)).unwrap();
    let mut out = Array::placeholder((3, 2), DType::I32);
    Concatenate::new(0, S).eval(&[t, b], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_concatenate_rank_mismatch() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 2], (1, 2)).unwrap();
    let b = Array::from_vec(vec![3i32, 4], 2usize).unwrap();
    let mut out = Array::placeholder((2, 2), DType::I32);
    assert!(matches!(
        Concatenate::new(0, S).eval(&[a, b], &mut out, &dev),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_concatenate_non_axis_dim_mismatch() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 2, 3], (1, 3)).unwrap();
    let b = Array::from_vec(vec![4i32, 5], (1, 2)).unwrap();
    let mut out = Array::placeholder((2, 3), DType::I32);
    assert!(matches!(
        Concatenate::new(0, S).eval(&[a, b], &mut out, &dev),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_concatenate_dtype_mismatch() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 2], 2usize).unwrap();
    let b = Array::from_vec(vec![3.0f32, 4.0], 2usize).unwrap();
    let mut out = Array::placeholder(4usize, DType::I32);
    assert!(matches!(
        Concatenate::new(0, S).eval(&[a, b], &mut out, &dev),
        Err(Error::DTypeMismatch { .. })
    ));
}

// ─────────────────────────────────────────────────────────────────────────
// Reshape
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_reshape_contiguous_is_a_view() {
    let dev = SimDevice::new();
    let input = Array::from_vec((0..6).collect::<Vec<i32>>(), (2, 3)).unwrap();
    let mut out = Array::placeholder((3, 2), DType::I32);
    Reshape::new(S).eval(&[input.clone()], &mut out, &dev).unwrap();
    assert!(out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    assert!(out.flags().row_contiguous);
    assert!(dev.launches().is_empty());
}

#[test]
fn test_reshape_transposed_copies() {
    let dev = SimDevice::new();
    let input = Array::from_vec((0..6).collect::<Vec<i32>>(), (2, 3)).unwrap();
    let t = input.transpose(0, 1).unwrap();
    let mut out = Array::placeholder(6usize, DType::I32);
    Reshape::new(S).eval(&[t], &mut out, &dev).unwrap();
    assert!(!out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
    // Logical order of the transpose, now densely materialized.
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![0, 3, 1, 4, 2, 5]);
    assert_eq!(dev.launches().len(), 1);
}

#[test]
fn test_reshape_broadcast_copies() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![7u64, 9], 2usize).unwrap();
    let b = input.broadcast_to((3, 2)).unwrap();
    let mut out = Array::placeholder(6usize, DType::U64);
    Reshape::new(S).eval(&[b], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<u64>().unwrap(), vec![7, 9, 7, 9, 7, 9]);
    assert!(!out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
}

#[test]
fn test_reshape_split_strided_dim_stays_view() {
    // A column-sliced view can still split its outer dimension in place.
    let dev = SimDevice::new();
    let input = Array::from_vec((0..24).collect::<Vec<i32>>(), (4, 6)).unwrap();
    let mut sliced = Array::placeholder((4, 3), DType::I32);
    Slice::new(vec![0, 0], vec![1, 2], S)
        .unwrap()
        .eval(&[input], &mut sliced, &dev)
        .unwrap();
    let mut out = Array::placeholder((2, 2, 3), DType::I32);
    Reshape::new(S).eval(&[sliced.clone()], &mut out, &dev).unwrap();
    assert!(out.buffer().unwrap().ptr_eq(sliced.buffer().unwrap()));
    assert_eq!(
        out.to_vec::<i32>().unwrap(),
        vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22]
    );
}

#[test]
fn test_reshape_element_count_mismatch() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3], 3usize).unwrap();
    let mut out = Array::placeholder(4usize, DType::I32);
    assert!(matches!(
        Reshape::new(S).eval(&[input], &mut out, &dev),
        Err(Error::ElementCountMismatch { .. })
    ));
}

// ─────────────────────────────────────────────────────────────────────────
// Compositions
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_pad_then_slice_recovers_input() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3, 4], (2, 2)).unwrap();
    let fill = Array::scalar(0i32);
    let mut padded = Array::placeholder((4, 4), DType::I32);
    Pad::new(vec![0, 1], vec![1, 1], S)
        .eval(&[input.clone(), fill], &mut padded, &dev)
        .unwrap();

    let mut back = Array::placeholder((2, 2), DType::I32);
    Slice::new(vec![1, 1], vec![1, 1], S)
        .unwrap()
        .eval(&[padded], &mut back, &dev)
        .unwrap();
    assert_eq!(back.to_vec::<i32>().unwrap(), input.to_vec::<i32>().unwrap());
}

#[test]
fn test_concatenate_then_slice_recovers_parts() {
    let dev = SimDevice::new();
    let a = Array::from_vec(vec![1i32, 2], 2usize).unwrap();
    let b = Array::from_vec(vec![3i32, 4, 5], 3usize).unwrap();
    let mut cat = Array::placeholder(5usize, DType::I32);
    Concatenate::new(0, S).eval(&[a.clone(), b.clone()], &mut cat, &dev).unwrap();

    let mut first = Array::placeholder(2usize, DType::I32);
    Slice::new(vec![0], vec![1], S)
        .unwrap()
        .eval(&[cat.clone()], &mut first, &dev)
        .unwrap();
    let mut second = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![2], vec![1], S)
        .unwrap()
        .eval(&[cat], &mut second, &dev)
        .unwrap();
    assert_eq!(first.to_vec::<i32>().unwrap(), a.to_vec::<i32>().unwrap());
    assert_eq!(second.to_vec::<i32>().unwrap(), b.to_vec::<i32>().unwrap());
}

#[test]
fn test_slice_of_slice_composes() {
    let dev = SimDevice::new();
    let input = Array::from_vec((0..10).collect::<Vec<i32>>(), 10usize).unwrap();
    let mut middle = Array::placeholder(6usize, DType::I32);
    Slice::new(vec![2], vec![1], S)
        .unwrap()
        .eval(&[input.clone()], &mut middle, &dev)
        .unwrap();
    let mut inner = Array::placeholder(3usize, DType::I32);
    Slice::new(vec![1], vec![2], S)
        .unwrap()
        .eval(&[middle], &mut inner, &dev)
        .unwrap();
    // Offsets and stride scales compose; still a view of the first buffer.
    assert_eq!(inner.to_vec::<i32>().unwrap(), vec![3, 5, 7]);
    assert!(inner.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
}

// ─────────────────────────────────────────────────────────────────────────
// RandomBits
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_random_bits_deterministic() {
    let dev = SimDevice::new();
    let keys = Array::from_vec(vec![1u64, 2], 2usize).unwrap();
    let mut a = Array::placeholder(5usize, DType::U32);
    let mut b = Array::placeholder(5usize, DType::U32);
    RandomBits::new(S).eval(&[keys.clone()], &mut a, &dev).unwrap();
    RandomBits::new(S).eval(&[keys], &mut b, &dev).unwrap();
    assert_eq!(a.to_vec::<u32>().unwrap(), b.to_vec::<u32>().unwrap());
}

#[test]
fn test_random_bits_key_sensitivity() {
    let dev = SimDevice::new();
    let k1 = Array::from_vec(vec![1u64, 2], 2usize).unwrap();
    let k2 = Array::from_vec(vec![1u64, 3], 2usize).unwrap();
    let mut a = Array::placeholder(8usize, DType::U32);
    let mut b = Array::placeholder(8usize, DType::U32);
    RandomBits::new(S).eval(&[k1], &mut a, &dev).unwrap();
    RandomBits::new(S).eval(&[k2], &mut b, &dev).unwrap();
    assert_ne!(a.to_vec::<u32>().unwrap(), b.to_vec::<u32>().unwrap());
}

#[test]
fn test_random_bits_strided_keys_match_contiguous() {
    let dev = SimDevice::new();
    let dense = Array::from_vec(vec![1u64, 2, 3, 4], (2, 2)).unwrap();
    // Same logical key pairs through a transposed buffer.
    let strided = Array::from_vec(vec![1u64, 3, 2, 4], (2, 2))
        .unwrap()
        .transpose(0, 1)
        .unwrap();
    let mut a = Array::placeholder(4usize, DType::U32);
    let mut b = Array::placeholder(4usize, DType::U32);
    RandomBits::new(S).eval(&[dense], &mut a, &dev).unwrap();
    RandomBits::new(S).eval(&[strided], &mut b, &dev).unwrap();
    assert_eq!(a.to_vec::<u32>().unwrap(), b.to_vec::<u32>().unwrap());
}

#[test]
fn test_random_bits_per_key_blocks_differ() {
    let dev = SimDevice::new();
    let keys = Array::from_vec(vec![1u64, 2, 9u64, 9], (2, 2)).unwrap();
    let mut out = Array::placeholder((2, 4), DType::U32);
    RandomBits::new(S).eval(&[keys], &mut out, &dev).unwrap();
    let v = out.to_vec::<u32>().unwrap();
    assert_ne!(&v[..4], &v[4..]);
}

#[test]
fn test_random_bits_rejects_bad_keys() {
    let dev = SimDevice::new();
    let mut out = Array::placeholder(4usize, DType::U32);
    let not_u64 = Array::from_vec(vec![1u32, 2], 2usize).unwrap();
    assert!(RandomBits::new(S).eval(&[not_u64], &mut out, &dev).is_err());
    let wrong_trailing = Array::from_vec(vec![1u64, 2, 3], 3usize).unwrap();
    assert!(RandomBits::new(S)
        .eval(&[wrong_trailing], &mut out, &dev)
        .is_err());
}

// ─────────────────────────────────────────────────────────────────────────
// Full / AsType / Conjugate
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_full_from_scalar() {
    let dev = SimDevice::new();
    let value = Array::scalar(7i32);
    let mut out = Array::placeholder((2, 2), DType::I32);
    Full::new(S).eval(&[value], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![7, 7, 7, 7]);
}

#[test]
fn test_full_materializes_contiguous_input() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 2, 3], 3usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    Full::new(S).eval(&[input.clone()], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, 3]);
    assert!(!out.buffer().unwrap().ptr_eq(input.buffer().unwrap()));
}

#[test]
fn test_as_type_conversion() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.5f32, 2.0, -3.5], 3usize).unwrap();
    let mut out = Array::placeholder(3usize, DType::I32);
    AsType::new(S).eval(&[input], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<i32>().unwrap(), vec![1, 2, -3]);
}

#[test]
fn test_as_type_strided_input() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1i32, 3, 2, 4], (2, 2)).unwrap();
    let t = input.transpose(0, 1).unwrap();
    let mut out = Array::placeholder((2, 2), DType::F32);
    AsType::new(S).eval(&[t], &mut out, &dev).unwrap();
    assert_eq!(out.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_conjugate() {
    let dev = SimDevice::new();
    let mut bytes = Vec::new();
    for v in [1.0f32, 2.0, 3.0, -4.0] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    let input = Array::from_raw_parts(bytes, 2usize, DType::C64).unwrap();
    let mut out = Array::placeholder(2usize, DType::C64);
    Conjugate::new(S).eval(&[input], &mut out, &dev).unwrap();

    let got = out.to_bytes().unwrap();
    let mut parts = Vec::new();
    for chunk in got.chunks(4) {
        parts.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    assert_eq!(parts, vec![1.0, -2.0, 3.0, 4.0]);
}

#[test]
fn test_conjugate_rejects_real_dtype() {
    let dev = SimDevice::new();
    let input = Array::from_vec(vec![1.0f32], 1usize).unwrap();
    let mut out = Array::placeholder(1usize, DType::F32);
    assert!(matches!(
        Conjugate::new(S).eval(&[input], &mut out, &dev),
        Err(Error::UnsupportedDType { .. })
    ));
}

// ─────────────────────────────────────────────────────────────────────────
// Unimplemented factorizations
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_svd_not_implemented_names_backend() {
    let dev = SimDevice::new();
    let err = Svd::new(S).eval(&[], &mut [], &dev).unwrap_err();
    match err {
        Error::NotImplemented { op, backend } => {
            assert_eq!(op, "SVD");
            assert_eq!(backend, "sim");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Allocator interaction
// ─────────────────────────────────────────────────────────────────────────

#[test]
fn test_impossible_allocation_fails() {
    let dev = SimDevice::with_allocator(HostAllocator::new(16));
    let mut out = Array::placeholder(100usize, DType::F32);
    assert!(matches!(
        Arange::new(0.0, 1.0, S).eval(&[], &mut out, &dev),
        Err(Error::AllocationFailed { .. })
    ));
}

#[test]
fn test_eval_blocks_until_memory_reclaimed() {
    let alloc = HostAllocator::new(100);
    let held = alloc.malloc_or_wait(80).unwrap();

    let alloc2 = alloc.clone();
    let worker = std::thread::spawn(move || {
        let dev = SimDevice::with_allocator(alloc2);
        let mut out = Array::placeholder(10usize, DType::I32);
        // 40 bytes: parks until the held 80-byte buffer is released.
        Arange::new(0.0, 1.0, S).eval(&[], &mut out, &dev).unwrap();
        out.to_vec::<i32>().unwrap()
    });

    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(alloc.bytes_in_use(), 80);
    drop(held);
    assert_eq!(worker.join().unwrap(), (0..10).collect::<Vec<i32>>());
}

#[test]
fn test_view_ops_allocate_nothing() {
    let alloc = HostAllocator::new(1 << 20);
    let dev = SimDevice::with_allocator(alloc.clone());
    let input = Array::from_vec((0..6).collect::<Vec<i32>>(), (2, 3)).unwrap();
    let mut reshaped = Array::placeholder(Shape::from(6usize), DType::I32);
    Reshape::new(S).eval(&[input.clone()], &mut reshaped, &dev).unwrap();
    let mut sliced = Array::placeholder(2usize, DType::I32);
    Slice::new(vec![1], vec![2], S)
        .unwrap()
        .eval(&[reshaped], &mut sliced, &dev)
        .unwrap();
    assert_eq!(sliced.to_vec::<i32>().unwrap(), vec![1, 3]);
    assert_eq!(alloc.stats().peak, 0);
}

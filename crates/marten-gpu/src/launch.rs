use crate::device::GridDims;

// Launch geometry — grid and thread-group sizing
//
// Geometry is derived per invocation, never stored: the grid covers the
// output element count, the group size is clamped to the kernel's reported
// hardware limit.

/// Width of one SIMD execution unit on the target hardware.
pub const SIMD_SIZE: usize = 32;

/// Elements each thread reads in the arg-reduce kernels.
pub const ARG_REDUCE_N_READS: usize = 4;

/// One-dimensional launch over `n` elements: grid (n, 1, 1), group
/// (min(n, kernel_max), 1, 1).
pub fn linear_grid(n: usize, kernel_max: usize) -> (GridDims, GridDims) {
    (GridDims::linear(n), GridDims::linear(n.min(kernel_max)))
}

/// Thread-group size for an arg-reduce over an axis of `axis_size`
/// elements.
///
/// Starts from ceil(axis_size / reads-per-thread), clamps to the kernel's
/// hardware limit, then rounds up to the nearest SIMD_SIZE multiple so a
/// thread-group always performs full-width parallel reductions with no
/// partial-SIMD edge handling inside the kernel. The hardware limit is a
/// SIMD_SIZE multiple, so rounding never exceeds it.
pub fn arg_reduce_group_size(axis_size: usize, kernel_max: usize) -> usize {
    let wanted = axis_size.div_ceil(ARG_REDUCE_N_READS).max(1);
    let clamped = wanted.min(kernel_max);
    let rounded = clamped.div_ceil(SIMD_SIZE) * SIMD_SIZE;
    debug_assert!(rounded <= kernel_max);
    rounded
}

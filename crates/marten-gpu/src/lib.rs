//! # marten-gpu
//!
//! The operation dispatch layer: given input arrays and an output
//! placeholder, each primitive decides between aliasing memory and invoking
//! a device kernel, packs the kernel's positional arguments, and derives
//! the launch geometry.
//!
//! ## Key concepts
//!
//! - **View vs copy** — reshape, slice, and the empty slice-update alias an
//!   existing buffer by rewriting (strides, offset, flags); everything else
//!   funnels through the four-mode copy dispatcher in [`copy`].
//! - **The argument-slot contract** — kernel arguments are positional raw
//!   bytes; the slot layout for each kernel family lives next to its
//!   dispatcher and is decoded verbatim by the software device in [`sim`].
//! - **Launch geometry** — derived per dispatch in [`launch`]: linear grids
//!   clamped to the kernel's hardware limit, SIMD-rounded thread-groups for
//!   the arg-reduce family.
//!
//! Hardware backends implement the [`device`] traits; [`sim::SimDevice`]
//! implements them over host memory so every dispatcher is testable without
//! a GPU.

pub mod copy;
pub mod device;
pub mod launch;
pub mod primitives;
pub mod sim;

pub use copy::{copy_gpu, copy_gpu_inplace, copy_kernel_name, CopyType};
pub use device::{CommandEncoder, Device, GridDims, Kernel, Stream};
pub use primitives::{
    Arange, ArgReduce, ArgReduceKind, AsType, Concatenate, Conjugate, Full, MatrixInverse, Pad,
    QrFactorization, RandomBits, Reshape, Slice, SliceUpdate, Svd,
};
pub use sim::{LaunchRecord, SimDevice};

use marten_core::{Allocator, Array, Result};

// Device — Abstraction over the command-submission backend
//
// The dispatch layer never talks to hardware directly; it consumes these
// traits. A hardware backend (Metal, CUDA, ...) implements them in its own
// crate; the software device in [`crate::sim`] implements them over host
// memory so the dispatch logic is testable anywhere.
//
// THE ARGUMENT-SLOT CONTRACT:
//
// Kernel arguments are positional. Input/output buffers and raw scalar or
// array bytes are bound at fixed slot indices that must match the device
// kernel's signature exactly — a wrong slot or wrong byte width corrupts
// silently on real hardware. The slot layouts used by each dispatcher are
// therefore spelled out as constants next to the dispatch code, and the
// software device decodes the very same constants, so any drift between
// packing and unpacking fails loudly in tests.

/// Identifies the command queue an operation was scheduled onto. Kernel
/// submissions on one stream execute in submission order unless explicitly
/// marked concurrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Stream(pub usize);

/// Three-dimensional launch extent, used for both grids and thread-groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl GridDims {
    pub fn new(x: usize, y: usize, z: usize) -> GridDims {
        GridDims { x, y, z }
    }

    /// One-dimensional extent.
    pub fn linear(n: usize) -> GridDims {
        GridDims { x: n, y: 1, z: 1 }
    }

    pub fn total(&self) -> usize {
        self.x * self.y * self.z
    }
}

/// An executable kernel handle resolved from a name.
pub trait Kernel: Clone {
    fn name(&self) -> &str;

    /// Hardware-reported per-kernel launch limit; group sizes must not
    /// exceed it.
    fn max_total_threads_per_threadgroup(&self) -> usize;
}

/// A command submission context for one stream.
///
/// Binding methods stage arguments; `dispatch_threads` submits the staged
/// kernel over a grid of threads split into thread-groups. Between
/// `begin_concurrent` and `end_concurrent` the submitter asserts that the
/// enclosed dispatches have no mutual ordering dependency (they write
/// disjoint byte ranges), so the backend may overlap or reorder them.
pub trait CommandEncoder {
    type Kernel: Kernel;

    fn set_pipeline(&mut self, kernel: &Self::Kernel);
    fn set_input_array(&mut self, array: &Array, slot: usize);
    fn set_output_array(&mut self, array: &Array, slot: usize);
    fn set_bytes(&mut self, bytes: &[u8], slot: usize);
    fn dispatch_threads(&mut self, grid: GridDims, group: GridDims) -> Result<()>;
    fn begin_concurrent(&mut self);
    fn end_concurrent(&mut self);
}

/// The device/queue collaborator consumed by every dispatcher.
pub trait Device {
    type Kernel: Kernel;
    type Encoder: CommandEncoder<Kernel = Self::Kernel>;

    /// Backend name, used in not-implemented-on-backend errors.
    fn name(&self) -> &'static str;

    /// Resolve a kernel by its operation+dtype-qualified name. Fails with
    /// [`marten_core::Error::KernelNotFound`] if the kernel is not
    /// registered for this backend.
    fn get_kernel(&self, name: &str) -> Result<Self::Kernel>;

    /// A submission context for the given stream.
    fn command_encoder(&self, stream: Stream) -> Result<Self::Encoder>;

    /// The memory allocator. `malloc_or_wait` on it is the only call in the
    /// dispatch layer that may block.
    fn allocator(&self) -> &dyn Allocator;
}

// Raw-byte packing helpers for auxiliary arguments. Shapes travel as i32
// words and strides as u64 words; the software device decodes the same
// widths.

pub(crate) fn pack_i32s(values: &[usize]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        out.extend_from_slice(&(v as i32).to_le_bytes());
    }
    out
}

pub(crate) fn pack_u64s(values: &[usize]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for &v in values {
        out.extend_from_slice(&(v as u64).to_le_bytes());
    }
    out
}

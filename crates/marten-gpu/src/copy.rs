use marten_core::{Array, Result, Shape};

use crate::device::{pack_i32s, pack_u64s, CommandEncoder, Device, Kernel, Stream};
use crate::launch;

// Copy — the materializing-copy collaborator
//
// Every operation that cannot alias memory funnels through one of four copy
// kernels, graded by the strided-layout complexity of the transfer. The
// copy kernels also perform dtype conversion, which is how AsType is a
// plain copy.

/// Strided-layout complexity of a materializing copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyType {
    /// Broadcast one source element over the whole destination.
    Scalar,
    /// Dense linear copy, both sides contiguous.
    Vector,
    /// Strided source, destination written densely in the source's logical
    /// row-major order (same rank both sides).
    General,
    /// Independent strides on both sides.
    GeneralGeneral,
}

impl CopyType {
    fn tag(&self) -> &'static str {
        match self {
            CopyType::Scalar => "s",
            CopyType::Vector => "v",
            CopyType::General => "g",
            CopyType::GeneralGeneral => "gg",
        }
    }

    /// Whether this mode carries shape/stride auxiliary arguments.
    pub fn is_strided(&self) -> bool {
        matches!(self, CopyType::General | CopyType::GeneralGeneral)
    }
}

/// Kernel name for a copy of the given mode and dtype pair.
pub fn copy_kernel_name(
    ctype: CopyType,
    src: marten_core::DType,
    dst: marten_core::DType,
) -> String {
    format!("copy_{}_{}_{}", ctype.tag(), src.kernel_name(), dst.kernel_name())
}

// Argument slots shared by the strided copy kernels. The software device
// decodes these same constants.
pub(crate) const COPY_SLOT_SRC: usize = 0;
pub(crate) const COPY_SLOT_DST: usize = 1;
pub(crate) const COPY_SLOT_SHAPE: usize = 2;
pub(crate) const COPY_SLOT_SRC_STRIDES: usize = 3;
pub(crate) const COPY_SLOT_DST_STRIDES: usize = 4;
pub(crate) const COPY_SLOT_NDIM: usize = 5;
pub(crate) const COPY_SLOT_SRC_OFFSET: usize = 6;
pub(crate) const COPY_SLOT_DST_OFFSET: usize = 7;

/// Materialize `src` into `out`, allocating `out`'s buffer if needed.
///
/// For the strided modes the data shape is the source's logical shape and
/// the destination is written densely in that order (how a reshape copy
/// linearizes a transposed input, for example).
pub fn copy_gpu<D: Device>(
    src: &Array,
    out: &mut Array,
    ctype: CopyType,
    dev: &D,
    stream: Stream,
) -> Result<()> {
    if !out.has_data() {
        if ctype == CopyType::Vector {
            // A vector copy transfers the source's addressed buffer region
            // verbatim, so the destination must describe its memory with
            // the source's strides and flags or logical order would be
            // lost for column-contiguous sources.
            let nbytes = src.data_size() * out.itemsize();
            out.set_data_with_layout(
                dev.allocator().malloc_or_wait(nbytes)?,
                src.strides().to_vec(),
                src.flags(),
                src.data_size(),
            );
        } else {
            out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
        }
    }
    if out.size() == 0 {
        return Ok(());
    }
    let data_shape = src.shape().clone();
    let src_strides = src.strides().to_vec();
    let dst_strides = data_shape.stride_contiguous();
    copy_gpu_inplace(
        src,
        out,
        &data_shape,
        &src_strides,
        &dst_strides,
        0,
        0,
        ctype,
        dev,
        stream,
    )
}

/// Offset-aware copy into an existing destination (possibly a shared-buffer
/// view of a larger output, as used by pad, slicing, and concatenation).
///
/// `src_offset`/`dst_offset` are element offsets applied on top of each
/// array's own buffer offset.
#[allow(clippy::too_many_arguments)]
pub fn copy_gpu_inplace<D: Device>(
    src: &Array,
    dst: &mut Array,
    data_shape: &Shape,
    src_strides: &[usize],
    dst_strides: &[usize],
    src_offset: usize,
    dst_offset: usize,
    ctype: CopyType,
    dev: &D,
    stream: Stream,
) -> Result<()> {
    let work = match ctype {
        CopyType::General | CopyType::GeneralGeneral => data_shape.elem_count(),
        CopyType::Vector => dst.data_size(),
        CopyType::Scalar => dst.size(),
    };
    if work == 0 {
        return Ok(());
    }

    let kernel = dev.get_kernel(&copy_kernel_name(ctype, src.dtype(), dst.dtype()))?;
    let mut enc = dev.command_encoder(stream)?;
    enc.set_pipeline(&kernel);
    enc.set_input_array(src, COPY_SLOT_SRC);
    enc.set_output_array(dst, COPY_SLOT_DST);

    if ctype.is_strided() {
        let ndim = data_shape.rank();
        enc.set_bytes(&pack_i32s(data_shape.dims()), COPY_SLOT_SHAPE);
        enc.set_bytes(&pack_u64s(src_strides), COPY_SLOT_SRC_STRIDES);
        enc.set_bytes(&pack_u64s(dst_strides), COPY_SLOT_DST_STRIDES);
        enc.set_bytes(&(ndim as u64).to_le_bytes(), COPY_SLOT_NDIM);
        enc.set_bytes(&(src_offset as u64).to_le_bytes(), COPY_SLOT_SRC_OFFSET);
        enc.set_bytes(&(dst_offset as u64).to_le_bytes(), COPY_SLOT_DST_OFFSET);
    }

    let (grid, group) = launch::linear_grid(work, kernel.max_total_threads_per_threadgroup());
    enc.dispatch_threads(grid, group)
}

use marten_core::{bail, with_native_dtype, Array, Buffer, DType, Error, Flags, Result, WithDType};

use crate::copy::{self, CopyType};
use crate::device::{pack_i32s, pack_u64s, CommandEncoder, Device, GridDims, Kernel, Stream};
use crate::launch;

// Primitives — one dispatcher per operation kind
//
// Each operation is stateless across invocations except for its immutable
// construction-time parameters and the stream it runs on. `eval` is a
// single-shot function of (inputs, output): validate preconditions, consult
// the layout logic to decide view vs copy, then either share a buffer (no
// device work) or allocate output memory and invoke a kernel with packed
// arguments and derived launch geometry.
//
// An output with zero logical elements short-circuits to an empty buffer
// assignment with no kernel launch, for every operation.

fn set_empty(out: &mut Array) {
    out.set_data(Buffer::from_vec(Vec::new()));
}

fn check_arity(op: &'static str, expected: usize, inputs: &[Array]) -> Result<()> {
    if inputs.len() != expected {
        return Err(Error::InvalidInputCount {
            op,
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────
// Arange
// ─────────────────────────────────────────────────────────────────────────

pub(crate) const ARANGE_SLOT_START: usize = 0;
pub(crate) const ARANGE_SLOT_STEP: usize = 1;
pub(crate) const ARANGE_SLOT_OUT: usize = 2;

/// Range generation: out[i] = start + i * step, computed in the output's
/// dtype.
#[derive(Debug, Clone)]
pub struct Arange {
    start: f64,
    step: f64,
    stream: Stream,
}

impl Arange {
    pub fn new(start: f64, step: f64, stream: Stream) -> Arange {
        Arange { start, step, stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("arange", 0, inputs)?;
        // The start scalar and the step must be written as raw bytes of the
        // output dtype's exact width; bool and complex have no sensible
        // range semantics and fail fast, before any allocation.
        let (start_bytes, step_bytes) = arange_scalars(out.dtype(), self.start, self.step)?;

        out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
        if out.size() == 0 {
            return Ok(());
        }

        let kernel = dev.get_kernel(&format!("arange_{}", out.dtype().kernel_name()))?;
        let mut enc = dev.command_encoder(self.stream)?;
        enc.set_pipeline(&kernel);
        enc.set_bytes(&start_bytes, ARANGE_SLOT_START);
        enc.set_bytes(&step_bytes, ARANGE_SLOT_STEP);
        enc.set_output_array(out, ARANGE_SLOT_OUT);
        let (grid, group) =
            launch::linear_grid(out.size(), kernel.max_total_threads_per_threadgroup());
        enc.dispatch_threads(grid, group)
    }
}

/// Encode start and step as raw little-endian bytes of `dtype`'s width.
///
/// The step is computed as (start + step) - start *after* casting both ends
/// to the target dtype, so integer truncation behaves the same way the
/// kernel's typed arithmetic would.
fn arange_scalars(dtype: DType, start: f64, step: f64) -> Result<(Vec<u8>, Vec<u8>)> {
    with_native_dtype!(dtype, T => {
        let s = T::from_f64(start);
        let next = T::from_f64(start + step);
        let step = T::from_f64(next.to_f64() - s.to_f64());
        Ok((WithDType::to_le_bytes(s), WithDType::to_le_bytes(step)))
    }, Err(Error::UnsupportedDType { op: "arange", dtype }))
}

// ─────────────────────────────────────────────────────────────────────────
// ArgReduce
// ─────────────────────────────────────────────────────────────────────────

pub(crate) const ARG_REDUCE_SLOT_IN: usize = 0;
pub(crate) const ARG_REDUCE_SLOT_OUT: usize = 1;
pub(crate) const ARG_REDUCE_SLOT_SHAPE: usize = 2;
pub(crate) const ARG_REDUCE_SLOT_IN_STRIDES: usize = 3;
pub(crate) const ARG_REDUCE_SLOT_OUT_STRIDES: usize = 4;
pub(crate) const ARG_REDUCE_SLOT_NDIM: usize = 5;
pub(crate) const ARG_REDUCE_SLOT_AXIS_STRIDE: usize = 6;
pub(crate) const ARG_REDUCE_SLOT_AXIS_SIZE: usize = 7;

/// Which extremum an [`ArgReduce`] locates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgReduceKind {
    ArgMin,
    ArgMax,
}

/// Indexed reduction: the index of the first minimal/maximal element along
/// one axis. Output dtype is U32.
#[derive(Debug, Clone)]
pub struct ArgReduce {
    kind: ArgReduceKind,
    axis: usize,
    stream: Stream,
}

impl ArgReduce {
    pub fn new(kind: ArgReduceKind, axis: usize, stream: Stream) -> ArgReduce {
        ArgReduce { kind, axis, stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("arg_reduce", 1, inputs)?;
        let input = &inputs[0];
        if self.axis >= input.ndim() {
            return Err(Error::DimOutOfRange {
                dim: self.axis,
                rank: input.ndim(),
            });
        }
        if out.dtype() != DType::U32 {
            return Err(Error::DTypeMismatch {
                expected: DType::U32,
                got: out.dtype(),
            });
        }
        // An empty axis has no extremum to index.
        if input.dims()[self.axis] == 0 {
            bail!(
                "arg_reduce: cannot reduce over empty axis {} of shape {}",
                self.axis,
                input.shape()
            );
        }

        out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
        if out.size() == 0 {
            return Ok(());
        }

        // Remove the reduced axis from the shape/stride arguments; the
        // kernel walks the residual dimensions to find each slice, then
        // scans along the axis via its dedicated stride.
        let mut shape: Vec<usize> = input.dims().to_vec();
        let mut in_strides: Vec<usize> = input.strides().to_vec();
        let mut out_strides: Vec<usize> = out.strides().to_vec();
        let axis_stride = in_strides[self.axis];
        let axis_size = shape[self.axis];
        if out_strides.len() == in_strides.len() {
            out_strides.remove(self.axis);
        }
        in_strides.remove(self.axis);
        shape.remove(self.axis);
        let ndim = shape.len();

        let op_name = match self.kind {
            ArgReduceKind::ArgMin => "argmin",
            ArgReduceKind::ArgMax => "argmax",
        };
        let kernel =
            dev.get_kernel(&format!("{}_{}", op_name, input.dtype().kernel_name()))?;
        let group_size =
            launch::arg_reduce_group_size(axis_size, kernel.max_total_threads_per_threadgroup());
        let grid = GridDims::linear(out.size() * group_size);
        let group = GridDims::linear(group_size);

        let mut enc = dev.command_encoder(self.stream)?;
        enc.set_pipeline(&kernel);
        enc.set_input_array(input, ARG_REDUCE_SLOT_IN);
        enc.set_output_array(out, ARG_REDUCE_SLOT_OUT);
        if ndim == 0 {
            // The argument layout is positional and fixed; when the
            // residual rank is zero the slots still exist and get harmless
            // placeholders rather than being omitted.
            enc.set_bytes(&0i32.to_le_bytes(), ARG_REDUCE_SLOT_SHAPE);
            enc.set_bytes(&0u64.to_le_bytes(), ARG_REDUCE_SLOT_IN_STRIDES);
            enc.set_bytes(&0u64.to_le_bytes(), ARG_REDUCE_SLOT_OUT_STRIDES);
        } else {
            enc.set_bytes(&pack_i32s(&shape), ARG_REDUCE_SLOT_SHAPE);
            enc.set_bytes(&pack_u64s(&in_strides), ARG_REDUCE_SLOT_IN_STRIDES);
            enc.set_bytes(&pack_u64s(&out_strides), ARG_REDUCE_SLOT_OUT_STRIDES);
        }
        enc.set_bytes(&(ndim as u64).to_le_bytes(), ARG_REDUCE_SLOT_NDIM);
        enc.set_bytes(&(axis_stride as u64).to_le_bytes(), ARG_REDUCE_SLOT_AXIS_STRIDE);
        enc.set_bytes(&(axis_size as u64).to_le_bytes(), ARG_REDUCE_SLOT_AXIS_SIZE);
        enc.dispatch_threads(grid, group)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Pad
// ─────────────────────────────────────────────────────────────────────────

/// Padding: fill the output with a scalar value, then paste the input into
/// a computed sub-region view of the output.
#[derive(Debug, Clone)]
pub struct Pad {
    axes: Vec<isize>,
    low_pad: Vec<usize>,
    stream: Stream,
}

impl Pad {
    pub fn new(axes: Vec<isize>, low_pad: Vec<usize>, stream: Stream) -> Pad {
        Pad {
            axes,
            low_pad,
            stream,
        }
    }

    /// inputs = [base, pad_value]; pad_value must be a one-element array of
    /// the same dtype as base and out.
    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("pad", 2, inputs)?;
        let input = &inputs[0];
        let val = &inputs[1];
        if val.size() != 1 {
            bail!("pad: padding value must be a scalar, got shape {}", val.shape());
        }
        if val.dtype() != input.dtype() || input.dtype() != out.dtype() {
            return Err(Error::DTypeMismatch {
                expected: out.dtype(),
                got: if val.dtype() != out.dtype() {
                    val.dtype()
                } else {
                    input.dtype()
                },
            });
        }
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        // Fill the whole output with the pad value.
        copy::copy_gpu(val, out, CopyType::Scalar, dev, self.stream)?;

        // Locate the sub-region where the input lands.
        let mut data_offset = 0usize;
        for (i, &ax) in self.axes.iter().enumerate() {
            let ax = if ax < 0 {
                (out.ndim() as isize + ax) as usize
            } else {
                ax as usize
            };
            data_offset += out.strides()[ax] * self.low_pad[i];
        }

        // The region is a shared-buffer view of the output: input's shape,
        // output's strides, offset at the low-pad corner.
        let mut region = Array::placeholder(input.shape().clone(), out.dtype());
        region.copy_shared_buffer(
            out,
            out.strides().to_vec(),
            Flags::non_contiguous(),
            region.size(),
            data_offset,
        )?;

        // Paste with a fully general strided copy (distinct strides on each
        // side; the region's strides are the output's, not dense).
        let region_strides = region.strides().to_vec();
        copy::copy_gpu_inplace(
            input,
            &mut region,
            &input.shape().clone(),
            &input.strides().to_vec(),
            &region_strides,
            0,
            0,
            CopyType::GeneralGeneral,
            dev,
            self.stream,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Slice
// ─────────────────────────────────────────────────────────────────────────

/// Sub-range selection along each axis: per-axis start index and step.
///
/// Slicing is a pure view (strides scaled by step, offset moved to the
/// start corner) unless the caller requires a separately-owned dense buffer
/// for downstream overwrite safety, in which case the strided source region
/// is collapsed into freshly allocated memory.
#[derive(Debug, Clone)]
pub struct Slice {
    start: Vec<usize>,
    steps: Vec<usize>,
    contiguous_output: bool,
    stream: Stream,
}

impl Slice {
    pub fn new(start: Vec<usize>, steps: Vec<usize>, stream: Stream) -> Result<Slice> {
        if steps.iter().any(|&s| s == 0) {
            bail!("slice: steps must be positive");
        }
        Ok(Slice {
            start,
            steps,
            contiguous_output: false,
            stream,
        })
    }

    /// Require the result to own a densely packed buffer instead of
    /// aliasing the input.
    pub fn with_contiguous_output(mut self) -> Slice {
        self.contiguous_output = true;
        self
    }

    /// (element offset of the slice corner, view strides)
    fn prepare(&self, input: &Array) -> (usize, Vec<usize>) {
        let offset = self
            .start
            .iter()
            .zip(input.strides())
            .map(|(&s, &st)| s * st)
            .sum();
        let strides = input
            .strides()
            .iter()
            .zip(&self.steps)
            .map(|(&st, &sp)| st * sp)
            .collect();
        (offset, strides)
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("slice", 1, inputs)?;
        let input = &inputs[0];
        if self.start.len() != input.ndim() || self.steps.len() != input.ndim() {
            bail!(
                "slice: got {} start / {} step entries for rank {}",
                self.start.len(),
                self.steps.len(),
                input.ndim()
            );
        }
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        let (data_offset, view_strides) = self.prepare(input);

        if self.contiguous_output {
            out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
            let dst_strides = out.strides().to_vec();
            copy::copy_gpu_inplace(
                input,
                out,
                &out.shape().clone(),
                &view_strides,
                &dst_strides,
                data_offset,
                0,
                CopyType::General,
                dev,
                self.stream,
            )
        } else {
            let flags = Flags::compute(out.shape(), &view_strides);
            let data_size = input.data_size().saturating_sub(data_offset);
            out.copy_shared_buffer(input, view_strides, flags, data_size, data_offset)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// SliceUpdate
// ─────────────────────────────────────────────────────────────────────────

/// In-place slice update: materialize a copy of the base array, then copy
/// the update array into the destination's sliced sub-region.
#[derive(Debug, Clone)]
pub struct SliceUpdate {
    start: Vec<usize>,
    steps: Vec<usize>,
    stream: Stream,
}

impl SliceUpdate {
    pub fn new(start: Vec<usize>, steps: Vec<usize>, stream: Stream) -> Result<SliceUpdate> {
        if steps.iter().any(|&s| s == 0) {
            bail!("slice_update: steps must be positive");
        }
        Ok(SliceUpdate {
            start,
            steps,
            stream,
        })
    }

    /// inputs = [base, update].
    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("slice_update", 2, inputs)?;
        let base = &inputs[0];
        let update = &inputs[1];
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        // An empty update degenerates to a pure aliasing copy of the base,
        // with no re-validation of the (empty) update array.
        if update.size() == 0 {
            return out.alias(base);
        }

        // Materialize the destination as a copy of the base.
        let ctype = if base.data_size() == 1 {
            CopyType::Scalar
        } else if base.flags().contiguous && base.size() == base.data_size() {
            CopyType::Vector
        } else {
            CopyType::General
        };
        copy::copy_gpu(base, out, ctype, dev, self.stream)?;

        // Copy the update into the destination's sliced sub-region.
        let data_offset: usize = self
            .start
            .iter()
            .zip(out.strides())
            .map(|(&s, &st)| s * st)
            .sum();
        let region_strides: Vec<usize> = out
            .strides()
            .iter()
            .zip(&self.steps)
            .map(|(&st, &sp)| st * sp)
            .collect();
        let upd_strides = update.strides().to_vec();
        copy::copy_gpu_inplace(
            update,
            out,
            &update.shape().clone(),
            &upd_strides,
            &region_strides,
            0,
            data_offset,
            CopyType::GeneralGeneral,
            dev,
            self.stream,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Concatenate
// ─────────────────────────────────────────────────────────────────────────

/// Concatenation along one axis: each input is copied into a shared-buffer
/// view of the output at its running placement offset. The per-input copies
/// target disjoint byte ranges and are submitted inside a concurrent
/// region, so the backend may overlap them.
#[derive(Debug, Clone)]
pub struct Concatenate {
    axis: usize,
    stream: Stream,
}

impl Concatenate {
    pub fn new(axis: usize, stream: Stream) -> Concatenate {
        Concatenate { axis, stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        if inputs.is_empty() {
            return Err(Error::InvalidInputCount {
                op: "concatenate",
                expected: 1,
                got: 0,
            });
        }
        if self.axis >= out.ndim() {
            return Err(Error::DimOutOfRange {
                dim: self.axis,
                rank: out.ndim(),
            });
        }
        for input in inputs {
            if input.dtype() != out.dtype() {
                return Err(Error::DTypeMismatch {
                    expected: out.dtype(),
                    got: input.dtype(),
                });
            }
            // Every input must match the output on rank and on all dims
            // except the concatenation axis.
            let rank_matches = input.ndim() == out.ndim();
            let dims_match = rank_matches
                && input
                    .dims()
                    .iter()
                    .zip(out.dims())
                    .enumerate()
                    .all(|(d, (&i, &o))| d == self.axis || i == o);
            if !dims_match {
                return Err(Error::ShapeMismatch {
                    expected: out.shape().clone(),
                    got: input.shape().clone(),
                });
            }
        }
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
        let strides = out.strides().to_vec();
        let axis_stride = strides[self.axis];

        let mut enc = dev.command_encoder(self.stream)?;
        enc.begin_concurrent();
        let mut offset_along_axis = 0usize;
        for input in inputs {
            let data_offset = axis_stride * offset_along_axis;
            let mut region = Array::placeholder(input.shape().clone(), out.dtype());
            region.copy_shared_buffer(
                out,
                strides.clone(),
                Flags::non_contiguous(),
                region.size(),
                data_offset,
            )?;
            copy::copy_gpu_inplace(
                input,
                &mut region,
                &input.shape().clone(),
                &input.strides().to_vec(),
                &strides,
                0,
                0,
                CopyType::GeneralGeneral,
                dev,
                self.stream,
            )?;
            offset_along_axis += input.dims()[self.axis];
        }
        enc.end_concurrent();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Reshape
// ─────────────────────────────────────────────────────────────────────────

/// Shape reinterpretation: a shared-buffer view when the input's strides
/// admit the new shape without reordering elements, otherwise a full
/// general-layout copy into fresh memory.
#[derive(Debug, Clone)]
pub struct Reshape {
    stream: Stream,
}

impl Reshape {
    pub fn new(stream: Stream) -> Reshape {
        Reshape { stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("reshape", 1, inputs)?;
        let input = &inputs[0];
        if input.size() != out.size() {
            return Err(Error::ElementCountMismatch {
                shape: out.shape().clone(),
                expected: out.size(),
                got: input.size(),
            });
        }
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        match input.layout().reshape_view_strides(out.shape()) {
            Some(strides) => {
                let flags = Flags::compute(out.shape(), &strides);
                out.copy_shared_buffer(input, strides, flags, input.data_size(), 0)
            }
            None => copy::copy_gpu(input, out, CopyType::General, dev, self.stream),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// RandomBits
// ─────────────────────────────────────────────────────────────────────────

pub(crate) const RBITS_SLOT_KEYS: usize = 0;
pub(crate) const RBITS_SLOT_OUT: usize = 1;
pub(crate) const RBITS_SLOT_ODD: usize = 2;
pub(crate) const RBITS_SLOT_BYTES_PER_KEY: usize = 3;
pub(crate) const RBITS_SLOT_NDIM: usize = 4;
pub(crate) const RBITS_SLOT_SHAPE: usize = 5;
pub(crate) const RBITS_SLOT_STRIDES: usize = 6;

/// Counter-based pseudorandom bit generation.
///
/// The key array has shape (N1, ..., NK, 2) of u64 words — each key is a
/// 128-bit seed — and the output holds `out.size() / num_keys` elements per
/// key. Identical keys produce bit-identical output.
#[derive(Debug, Clone)]
pub struct RandomBits {
    stream: Stream,
}

impl RandomBits {
    pub fn new(stream: Stream) -> RandomBits {
        RandomBits { stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("random_bits", 1, inputs)?;
        let keys = &inputs[0];
        if keys.dtype() != DType::U64 {
            return Err(Error::DTypeMismatch {
                expected: DType::U64,
                got: keys.dtype(),
            });
        }
        if keys.ndim() == 0 || keys.dims()[keys.ndim() - 1] != 2 {
            bail!("random_bits: keys must have a trailing dimension of 2, got {}", keys.shape());
        }
        if out.size() == 0 {
            set_empty(out);
            return Ok(());
        }

        let num_keys = keys.size() / 2;
        let elems_per_key = out.size() / num_keys;
        let bytes_per_key = out.itemsize() * elems_per_key;

        out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);

        // The kernel emits 4-byte words; the grid's second axis covers half
        // the words per key (each thread writes a pair), with the odd
        // trailing word handled by a flagged extra column.
        let words_per_key = bytes_per_key.div_ceil(4);
        let half_size = words_per_key / 2;
        let odd = words_per_key % 2 == 1;

        let kname = if keys.flags().row_contiguous {
            "rbitsc"
        } else {
            "rbits"
        };
        let kernel = dev.get_kernel(kname)?;
        let grid = GridDims::new(num_keys, half_size + odd as usize, 1);
        let group = GridDims::linear(kernel.max_total_threads_per_threadgroup());

        let mut enc = dev.command_encoder(self.stream)?;
        enc.set_pipeline(&kernel);
        enc.set_input_array(keys, RBITS_SLOT_KEYS);
        enc.set_output_array(out, RBITS_SLOT_OUT);
        enc.set_bytes(&[odd as u8], RBITS_SLOT_ODD);
        enc.set_bytes(&(bytes_per_key as u64).to_le_bytes(), RBITS_SLOT_BYTES_PER_KEY);

        // Non-dense keys additionally need their layout so the kernel can
        // index them generically.
        if !keys.flags().row_contiguous {
            enc.set_bytes(&(keys.ndim() as i32).to_le_bytes(), RBITS_SLOT_NDIM);
            enc.set_bytes(&pack_i32s(keys.dims()), RBITS_SLOT_SHAPE);
            enc.set_bytes(&pack_u64s(keys.strides()), RBITS_SLOT_STRIDES);
        }
        enc.dispatch_threads(grid, group)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Copy-driven materializations
// ─────────────────────────────────────────────────────────────────────────

/// Materialize a (possibly broadcast) value over the whole output.
#[derive(Debug, Clone)]
pub struct Full {
    stream: Stream,
}

impl Full {
    pub fn new(stream: Stream) -> Full {
        Full { stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("full", 1, inputs)?;
        let input = &inputs[0];
        let ctype = if input.data_size() == 1 {
            CopyType::Scalar
        } else if input.flags().contiguous {
            CopyType::Vector
        } else {
            CopyType::General
        };
        copy::copy_gpu(input, out, ctype, dev, self.stream)
    }
}

/// Dtype conversion, expressed as a converting copy.
#[derive(Debug, Clone)]
pub struct AsType {
    stream: Stream,
}

impl AsType {
    pub fn new(stream: Stream) -> AsType {
        AsType { stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("as_type", 1, inputs)?;
        let input = &inputs[0];
        let ctype = if input.flags().contiguous {
            CopyType::Vector
        } else {
            CopyType::General
        };
        copy::copy_gpu(input, out, ctype, dev, self.stream)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Conjugate
// ─────────────────────────────────────────────────────────────────────────

pub(crate) const CONJ_SLOT_IN: usize = 0;
pub(crate) const CONJ_SLOT_OUT: usize = 1;

/// Complex conjugation. Must be called on complex input; any other output
/// dtype is a precondition violation.
#[derive(Debug, Clone)]
pub struct Conjugate {
    stream: Stream,
}

impl Conjugate {
    pub fn new(stream: Stream) -> Conjugate {
        Conjugate { stream }
    }

    pub fn eval<D: Device>(&self, inputs: &[Array], out: &mut Array, dev: &D) -> Result<()> {
        check_arity("conjugate", 1, inputs)?;
        let input = &inputs[0];
        if out.dtype() != DType::C64 {
            return Err(Error::UnsupportedDType {
                op: "conjugate",
                dtype: out.dtype(),
            });
        }
        out.set_data(dev.allocator().malloc_or_wait(out.nbytes())?);
        if out.size() == 0 {
            return Ok(());
        }
        let kernel = dev.get_kernel("conj_complex64")?;
        let mut enc = dev.command_encoder(self.stream)?;
        enc.set_pipeline(&kernel);
        enc.set_input_array(input, CONJ_SLOT_IN);
        enc.set_output_array(out, CONJ_SLOT_OUT);
        let (grid, group) =
            launch::linear_grid(out.size(), kernel.max_total_threads_per_threadgroup());
        enc.dispatch_threads(grid, group)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Unimplemented linear-algebra factorizations
// ─────────────────────────────────────────────────────────────────────────
//
// These deterministically fail with an error naming the operation and
// backend rather than attempting a partial or incorrect computation.

macro_rules! not_implemented_op {
    ($name:ident, $label:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            #[allow(dead_code)]
            stream: Stream,
        }

        impl $name {
            pub fn new(stream: Stream) -> $name {
                $name { stream }
            }

            pub fn eval<D: Device>(
                &self,
                _inputs: &[Array],
                _outputs: &mut [Array],
                dev: &D,
            ) -> Result<()> {
                Err(Error::NotImplemented {
                    op: $label,
                    backend: dev.name(),
                })
            }
        }
    };
}

not_implemented_op!(QrFactorization, "QR factorization");
not_implemented_op!(Svd, "SVD");
not_implemented_op!(MatrixInverse, "matrix inversion");

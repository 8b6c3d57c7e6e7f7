use crate::bail;
use crate::buffer::Buffer;
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::layout::{Flags, Layout};
use crate::shape::Shape;

// Array — The value type flowing through the dispatch layer
//
// An Array is an immutable-shape, mutable-contents tensor handle:
//
//   1. dtype + layout (shape, strides, element offset) + contiguity flags
//   2. an optional reference-counted Buffer — graph evaluation creates
//      arrays as metadata-only placeholders; an operation's `eval` fills in
//      (or aliases) the buffer
//   3. data_size: how many elements of the underlying buffer this array's
//      region addresses (may exceed the logical element count for strided
//      views, or be 1 for a broadcast scalar)
//
// VIEWS:
//
//   `copy_shared_buffer` is the only aliasing mechanism: it points this
//   array at another array's buffer with a new (strides, offset, flags)
//   description. Reshape, slice, the pad destination sub-region, and the
//   concatenation destination sub-regions are all built this way. A view's
//   addressable byte range must lie within the buffer — checked here, once,
//   instead of trusting every call site.

/// An n-dimensional array value, possibly sharing its buffer with others.
#[derive(Debug, Clone)]
pub struct Array {
    dtype: DType,
    layout: Layout,
    flags: Flags,
    data: Option<Buffer>,
    data_size: usize,
}

impl Array {
    /// Metadata-only array: shape and dtype fixed, no buffer yet.
    ///
    /// This is how arrays arrive at an operation's `eval`: the output is a
    /// placeholder the operation must fill in via `set_data` or a
    /// shared-buffer view.
    pub fn placeholder(shape: impl Into<Shape>, dtype: DType) -> Array {
        let shape = shape.into();
        let rank = shape.rank();
        let size = shape.elem_count();
        Array {
            dtype,
            layout: Layout::contiguous(shape),
            flags: Flags::contiguous_default(rank),
            data: None,
            data_size: size,
        }
    }

    /// Build a dense array from host values.
    pub fn from_vec<T: WithDType>(values: Vec<T>, shape: impl Into<Shape>) -> Result<Array> {
        let shape = shape.into();
        if values.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                expected: shape.elem_count(),
                got: values.len(),
                shape,
            });
        }
        let mut bytes = Vec::with_capacity(values.len() * T::DTYPE.size_in_bytes());
        for v in &values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut arr = Array::placeholder(shape, T::DTYPE);
        arr.set_data(Buffer::from_vec(bytes));
        Ok(arr)
    }

    /// Build a dense array from raw little-endian bytes (the only host
    /// constructor for dtypes without a native Rust representation).
    pub fn from_raw_parts(bytes: Vec<u8>, shape: impl Into<Shape>, dtype: DType) -> Result<Array> {
        let shape = shape.into();
        let expected = shape.elem_count() * dtype.size_in_bytes();
        if bytes.len() != expected {
            bail!(
                "raw data of {} bytes does not match shape {} of dtype {} ({} bytes)",
                bytes.len(),
                shape,
                dtype,
                expected
            );
        }
        let mut arr = Array::placeholder(shape, dtype);
        arr.set_data(Buffer::from_vec(bytes));
        Ok(arr)
    }

    /// A 0-dimensional array holding one value.
    pub fn scalar<T: WithDType>(value: T) -> Array {
        Array::from_vec(vec![value], ()).expect("scalar shape always matches")
    }

    // Accessors

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        self.layout.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.layout.dims()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    /// Element offset of this array's data within its buffer.
    pub fn offset(&self) -> usize {
        self.layout.offset()
    }

    pub fn ndim(&self) -> usize {
        self.layout.rank()
    }

    /// Logical element count.
    pub fn size(&self) -> usize {
        self.layout.elem_count()
    }

    /// Elements of the underlying buffer region addressed by this array.
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Size of one element in bytes.
    pub fn itemsize(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    /// Logical size in bytes.
    pub fn nbytes(&self) -> usize {
        self.size() * self.itemsize()
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// The underlying buffer; an error if `eval` has not materialized one.
    pub fn buffer(&self) -> Result<&Buffer> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::msg("array has no materialized buffer"))
    }

    // Materialization and aliasing

    /// Attach freshly allocated memory: the array becomes densely
    /// row-contiguous over its own shape.
    pub fn set_data(&mut self, buffer: Buffer) {
        let shape = self.layout.shape().clone();
        let rank = shape.rank();
        self.layout = Layout::contiguous(shape);
        self.flags = Flags::contiguous_default(rank);
        self.data_size = self.size();
        self.data = Some(buffer);
    }

    /// Attach freshly allocated memory with an explicit layout description
    /// (the vector-copy path: the destination inherits the source's strides
    /// and flags so a linear buffer copy preserves logical order).
    pub fn set_data_with_layout(
        &mut self,
        buffer: Buffer,
        strides: Vec<usize>,
        flags: Flags,
        data_size: usize,
    ) {
        self.layout = Layout::new(self.layout.shape().clone(), strides, 0);
        self.flags = flags;
        self.data_size = data_size;
        self.data = Some(buffer);
    }

    /// Point this array at `other`'s buffer with a new layout description.
    ///
    /// `offset` is in elements, relative to `other`'s own offset. The
    /// resulting view's addressable byte range must lie within the buffer.
    pub fn copy_shared_buffer(
        &mut self,
        other: &Array,
        strides: Vec<usize>,
        flags: Flags,
        data_size: usize,
        offset: usize,
    ) -> Result<()> {
        let buffer = other.buffer()?.clone();
        let abs_offset = other.offset() + offset;

        // Bounds check: last reachable element of the view.
        if self.size() > 0 {
            let span: usize = self
                .dims()
                .iter()
                .zip(&strides)
                .map(|(&d, &s)| (d - 1) * s)
                .sum();
            let last_byte = (abs_offset + span + 1) * self.itemsize();
            if last_byte > buffer.size() {
                bail!(
                    "shared-buffer view out of bounds: view reaches byte {} of a {}-byte buffer",
                    last_byte,
                    buffer.size()
                );
            }
        }

        self.layout = Layout::new(self.layout.shape().clone(), strides, abs_offset);
        self.flags = flags;
        self.data_size = data_size;
        self.data = Some(buffer);
        Ok(())
    }

    /// Alias `other` wholesale: same buffer, same layout.
    pub fn alias(&mut self, other: &Array) -> Result<()> {
        self.data = Some(other.buffer()?.clone());
        self.layout = other.layout.clone();
        self.flags = other.flags;
        self.data_size = other.data_size;
        Ok(())
    }

    // View constructors (used heavily by tests to build non-contiguous inputs)

    /// Transposed view: swapped dims/strides, shared buffer.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> Result<Array> {
        let layout = self.layout.transpose(dim0, dim1)?;
        let flags = Flags::compute(layout.shape(), layout.strides());
        Ok(Array {
            dtype: self.dtype,
            flags,
            data: Some(self.buffer()?.clone()),
            data_size: self.data_size,
            layout,
        })
    }

    /// Broadcast view: stride-0 expansion to a larger shape, shared buffer.
    pub fn broadcast_to(&self, shape: impl Into<Shape>) -> Result<Array> {
        let target = shape.into();
        let strides = self.shape().broadcast_strides(&target)?;
        let flags = Flags::compute(&target, &strides);
        let layout = Layout::new(target, strides, self.offset());
        Ok(Array {
            dtype: self.dtype,
            flags,
            data: Some(self.buffer()?.clone()),
            data_size: self.data_size,
            layout,
        })
    }

    // Host transfer

    /// Read the array back to host values in row-major logical order,
    /// following strides and offset.
    pub fn to_vec<T: WithDType>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                got: T::DTYPE,
            });
        }
        let buffer = self.buffer()?;
        let bytes = buffer.read_all();
        let isz = self.itemsize();
        let mut out = Vec::with_capacity(self.size());
        for idx in self.layout.strided_indices() {
            let start = idx * isz;
            out.push(T::from_le_bytes(&bytes[start..start + isz]));
        }
        Ok(out)
    }

    /// Read the array back as raw little-endian bytes in logical order.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let buffer = self.buffer()?;
        let bytes = buffer.read_all();
        let isz = self.itemsize();
        let mut out = Vec::with_capacity(self.size() * isz);
        for idx in self.layout.strided_indices() {
            let start = idx * isz;
            out.extend_from_slice(&bytes[start..start + isz]);
        }
        Ok(out)
    }
}

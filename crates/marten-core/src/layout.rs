use crate::shape::Shape;

// Layout — Memory layout of an array (shape + strides + offset)
//
// The Layout decouples the *logical* shape of an array from how its data is
// arranged in memory. This is what makes reshape, slicing, and the padded /
// concatenated sub-region tricks "free": the bytes stay put and only the
// (strides, offset) description changes.
//
// KEY CONCEPTS:
//
// 1. **Strides**: How many elements to skip in the flat buffer to move one
//    step along each dimension. A contiguous [2,3] matrix has strides [3,1].
//
// 2. **Offset**: Where this array's element [0,...,0] sits in the buffer,
//    in elements. Slices and sub-region views only change the offset.
//
// 3. **View legality**: A reshape can reuse the same buffer exactly when the
//    existing strides enumerate elements in the same order the new shape
//    would in row-major order — that is what `reshape_view_strides` decides.
//
// All strides and offsets are unsigned element counts; byte conversion
// happens once, at argument-binding time, using the dtype's element size.

/// Layout describes how an array's logical shape maps to flat storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Offset into the buffer (in elements) where this array's data starts.
    offset: usize,
}

impl Layout {
    /// Create a new contiguous (row-major) layout for the given shape.
    pub fn contiguous(shape: Shape) -> Self {
        let strides = shape.stride_contiguous();
        Layout {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit strides and offset (for views).
    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Transpose two dimensions: swap shape and strides, keep the buffer.
    pub fn transpose(&self, dim0: usize, dim1: usize) -> crate::Result<Layout> {
        let rank = self.rank();
        if dim0 >= rank || dim1 >= rank {
            return Err(crate::Error::DimOutOfRange {
                dim: dim0.max(dim1),
                rank,
            });
        }
        let mut new_dims = self.shape.dims().to_vec();
        let mut new_strides = self.strides.clone();
        new_dims.swap(dim0, dim1);
        new_strides.swap(dim0, dim1);
        Ok(Layout::new(Shape::new(new_dims), new_strides, self.offset))
    }

    /// Decide whether this layout can be reinterpreted as `new_shape`
    /// without moving data, and if so return the strides of the view.
    ///
    /// The view is legal iff enumerating elements through the current
    /// strides visits them in the same order a row-major traversal of
    /// `new_shape` would. The walk groups the old dimensions into
    /// contiguous chunks (right to left) and tries to cover each chunk
    /// exactly with new dimensions; any chunk that cannot be covered means
    /// the data has to move and the caller must fall back to a copy.
    pub fn reshape_view_strides(&self, new_shape: &Shape) -> Option<Vec<usize>> {
        let old_dims = self.dims();
        let old_strides = &self.strides;
        let new_dims = new_shape.dims();
        if new_shape.elem_count() != self.elem_count() {
            return None;
        }
        // Degenerate cases: no elements, or a single element, can take any
        // shape — hand back plain contiguous strides.
        if self.elem_count() <= 1 {
            return Some(new_shape.stride_contiguous());
        }

        let mut new_strides = vec![0usize; new_dims.len()];
        let mut view_d = new_dims.len() as isize - 1;
        let mut chunk_base_stride = *old_strides.last()?;
        let mut chunk_numel = 1usize;
        let mut view_numel = 1usize;

        for tensor_d in (0..old_dims.len()).rev() {
            chunk_numel *= old_dims[tensor_d];
            // A chunk ends when the next (outer) old dimension is not
            // contiguous with the elements accumulated so far.
            let chunk_ends = tensor_d == 0
                || (old_dims[tensor_d - 1] != 1
                    && old_strides[tensor_d - 1] != chunk_numel * chunk_base_stride);
            if !chunk_ends {
                continue;
            }
            while view_d >= 0 && (view_numel < chunk_numel || new_dims[view_d as usize] == 1) {
                new_strides[view_d as usize] = view_numel * chunk_base_stride;
                view_numel *= new_dims[view_d as usize];
                view_d -= 1;
            }
            if view_numel != chunk_numel {
                return None;
            }
            if tensor_d > 0 {
                chunk_base_stride = old_strides[tensor_d - 1];
                chunk_numel = 1;
                view_numel = 1;
            }
        }
        if view_d != -1 {
            return None;
        }
        Some(new_strides)
    }

    /// Iterator over all flat buffer indices of this layout, in row-major
    /// logical order. Handles non-contiguous layouts by walking the
    /// multi-dimensional index and converting via strides.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter::new(self)
    }
}

// Flags — Contiguity metadata
//
// Mirrors what the dispatch layer needs to pick a copy strategy: whether the
// elements are laid out without gaps in row-major order, column-major order,
// or at all. Views produced by slicing or concatenation placement generally
// clear these.

/// Contiguity flags for an array's current layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub row_contiguous: bool,
    pub col_contiguous: bool,
    /// Dense in *some* order: safe for linear (Vector) copies.
    pub contiguous: bool,
}

impl Flags {
    /// Flags for a freshly allocated row-major array.
    pub fn contiguous_default(rank: usize) -> Flags {
        Flags {
            row_contiguous: true,
            // A scalar or vector that is row-contiguous is trivially also
            // column-contiguous.
            col_contiguous: rank <= 1,
            contiguous: true,
        }
    }

    /// Compute flags from a shape/strides pair.
    ///
    /// Dimensions of size 1 impose no constraint on their stride. The
    /// `contiguous` flag is the conservative union of the two orderings:
    /// anything else falls back to strided (General) copies.
    pub fn compute(shape: &Shape, strides: &[usize]) -> Flags {
        let dims = shape.dims();
        if shape.elem_count() <= 1 {
            return Flags {
                row_contiguous: true,
                col_contiguous: true,
                contiguous: true,
            };
        }

        let mut row = true;
        let mut acc = 1usize;
        for i in (0..dims.len()).rev() {
            if dims[i] == 1 {
                continue;
            }
            if strides[i] != acc {
                row = false;
                break;
            }
            acc *= dims[i];
        }

        let mut col = true;
        let mut acc = 1usize;
        for i in 0..dims.len() {
            if dims[i] == 1 {
                continue;
            }
            if strides[i] != acc {
                col = false;
                break;
            }
            acc *= dims[i];
        }

        Flags {
            row_contiguous: row,
            col_contiguous: col,
            contiguous: row || col,
        }
    }

    /// Flags with every bit cleared (for strided sub-region views).
    pub fn non_contiguous() -> Flags {
        Flags {
            row_contiguous: false,
            col_contiguous: false,
            contiguous: false,
        }
    }
}

// StridedIter — Iterates over flat buffer indices respecting strides
//
// For a contiguous layout this counts offset, offset+1, offset+2, ...
// For a transposed or sliced layout it jumps around following the strides.

/// Iterator that yields flat buffer indices for each element of a Layout.
pub struct StridedIter {
    current: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
    remaining: usize,
    started: bool,
}

impl StridedIter {
    fn new(layout: &Layout) -> Self {
        let rank = layout.rank();
        StridedIter {
            current: vec![0; rank],
            dims: layout.dims().to_vec(),
            strides: layout.strides().to_vec(),
            offset: layout.offset(),
            remaining: layout.elem_count(),
            started: false,
        }
    }

    fn flat_index(&self) -> usize {
        let mut idx = self.offset;
        for i in 0..self.current.len() {
            idx += self.current[i] * self.strides[i];
        }
        idx
    }

    fn advance(&mut self) {
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return;
            }
            self.current[i] = 0;
        }
    }
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        if self.started {
            self.advance();
        }
        self.started = true;
        self.remaining -= 1;
        Some(self.flat_index())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}

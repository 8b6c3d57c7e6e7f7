use crate::shape::Shape;

/// All errors that can occur within Marten.
///
/// A single error type is used across the workspace so that dispatch code can
/// propagate failures with `?` without conversion boilerplate. The variants
/// follow the failure taxonomy of the dispatch layer: precondition violations
/// (wrong arity, dtype mismatches, unsupported dtypes) are detected before
/// any allocation or kernel binding; backend gaps surface as `NotImplemented`;
/// allocator exhaustion beyond total capacity is `AllocationFailed`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two arrays.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between arrays participating in one operation.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Dimension index out of range for the array's rank.
    #[error("dimension out of range: dim {dim} for array with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// An operation received the wrong number of input arrays.
    #[error("{op}: expected {expected} input(s), got {got}")]
    InvalidInputCount {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    /// An operation does not support the requested dtype.
    #[error("{op}: unsupported dtype {dtype}")]
    UnsupportedDType {
        op: &'static str,
        dtype: crate::DType,
    },

    /// Element count mismatch (e.g. reshape to an incompatible shape).
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// The named kernel is not registered for the current backend/dtype.
    #[error("kernel '{name}' not found")]
    KernelNotFound { name: String },

    /// An operation has no implementation on this backend. Never a silent
    /// fallback: the op and backend are named so the caller knows exactly
    /// what is missing.
    #[error("{op} is not implemented on the {backend} backend")]
    NotImplemented {
        op: &'static str,
        backend: &'static str,
    },

    /// The allocator can never satisfy this request, even after reclaiming
    /// all outstanding memory.
    #[error("allocation of {requested} bytes exceeds device capacity of {capacity} bytes")]
    AllocationFailed { requested: usize, capacity: usize },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Marten.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

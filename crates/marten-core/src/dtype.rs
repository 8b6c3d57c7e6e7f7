use std::fmt;

// DType — Supported element data types
//
// Every array carries a DType that determines its element width and numeric
// behavior. The set covers the full accelerator surface:
//
//   Bool                — 1-byte boolean (masks, predicates)
//   U8/U16/U32/U64      — unsigned integers (indices, raw bits)
//   I8/I16/I32/I64      — signed integers
//   F16/BF16/F32        — floating point (half, brain-half, single)
//   C64                 — single-precision complex (two f32 words)
//
// Kernels are compiled per dtype, so the tag also determines the suffix used
// when building kernel names ("arange_float32", "argmax_int64", ...).

/// Enum of all supported element data types.
///
/// Stored inside every array so operations can dispatch to the correct
/// typed kernel at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F16,
    BF16,
    F32,
    C64,
}

impl DType {
    /// Every dtype, in declaration order.
    pub const ALL: [DType; 13] = [
        DType::Bool,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F16,
        DType::BF16,
        DType::F32,
        DType::C64,
    ];

    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::C64 => 8,
        }
    }

    /// Whether this dtype is a floating-point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::BF16 | DType::F32)
    }

    /// Whether this dtype is complex.
    pub fn is_complex(&self) -> bool {
        matches!(self, DType::C64)
    }

    /// The suffix used to qualify kernel names for this dtype.
    ///
    /// Kernel registration is per dtype; a kernel named `argmax_float32` is
    /// the f32 instantiation of the arg-max kernel. `Bool` keeps a trailing
    /// underscore to avoid colliding with the shader language keyword.
    pub fn kernel_name(&self) -> &'static str {
        match self {
            DType::Bool => "bool_",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F32 => "float32",
            DType::C64 => "complex64",
        }
    }

    /// Reverse lookup from a kernel-name suffix, used by software devices
    /// when decoding a resolved kernel name.
    pub fn from_kernel_name(name: &str) -> Option<DType> {
        DType::ALL.iter().copied().find(|d| d.kernel_name() == name)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Bool => "bool",
            other => other.kernel_name(),
        };
        write!(f, "{}", s)
    }
}

// WithDType — Trait that connects Rust scalar types to the DType enum
//
// The bridge between Rust's type system and the runtime DType tag. The byte
// conversions are what make the type dispatcher work: scalar kernel arguments
// (range start/step) must be written as raw bytes of the exact width the
// device kernel reads, and a software device needs to reinterpret buffer
// bytes as typed values.

/// Trait implemented by Rust scalar types that can live in an array.
pub trait WithDType:
    Copy + Send + Sync + 'static + num_traits::NumCast + PartialOrd + std::fmt::Debug
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;

    /// The value as little-endian bytes of exactly `DTYPE.size_in_bytes()`.
    fn to_le_bytes(self) -> Vec<u8>;

    /// Reinterpret little-endian bytes as a value of this type.
    fn from_le_bytes(bytes: &[u8]) -> Self;
}

macro_rules! with_dtype_prim {
    ($ty:ty, $dtype:ident) => {
        impl WithDType for $ty {
            const DTYPE: DType = DType::$dtype;
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> Self {
                v as $ty
            }
            fn to_le_bytes(self) -> Vec<u8> {
                <$ty>::to_le_bytes(self).to_vec()
            }
            fn from_le_bytes(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

with_dtype_prim!(u8, U8);
with_dtype_prim!(u16, U16);
with_dtype_prim!(u32, U32);
with_dtype_prim!(u64, U64);
with_dtype_prim!(i8, I8);
with_dtype_prim!(i16, I16);
with_dtype_prim!(i32, I32);
with_dtype_prim!(i64, I64);
with_dtype_prim!(f32, F32);

impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
    fn to_le_bytes(self) -> Vec<u8> {
        half::f16::to_le_bytes(self).to_vec()
    }
    fn from_le_bytes(bytes: &[u8]) -> Self {
        half::f16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
    fn to_le_bytes(self) -> Vec<u8> {
        half::bf16::to_le_bytes(self).to_vec()
    }
    fn from_le_bytes(bytes: &[u8]) -> Self {
        half::bf16::from_le_bytes([bytes[0], bytes[1]])
    }
}

/// Dispatch a runtime `DType` to a statically-typed code path.
///
/// The first arm binds a type alias for the native Rust type and evaluates
/// the body; `Bool` and `C64` (which have no `WithDType` representation)
/// fall through to the last expression. Adding a dtype means one new arm
/// here rather than edits at every call site.
///
/// ```ignore
/// let bytes = with_native_dtype!(dtype, T => T::from_f64(x).to_le_bytes(),
///     return Err(Error::UnsupportedDType { op: "arange", dtype }));
/// ```
#[macro_export]
macro_rules! with_native_dtype {
    ($dtype:expr, $T:ident => $body:expr, $fallback:expr) => {
        match $dtype {
            $crate::DType::U8 => {
                type $T = u8;
                $body
            }
            $crate::DType::U16 => {
                type $T = u16;
                $body
            }
            $crate::DType::U32 => {
                type $T = u32;
                $body
            }
            $crate::DType::U64 => {
                type $T = u64;
                $body
            }
            $crate::DType::I8 => {
                type $T = i8;
                $body
            }
            $crate::DType::I16 => {
                type $T = i16;
                $body
            }
            $crate::DType::I32 => {
                type $T = i32;
                $body
            }
            $crate::DType::I64 => {
                type $T = i64;
                $body
            }
            $crate::DType::F16 => {
                type $T = half::f16;
                $body
            }
            $crate::DType::BF16 => {
                type $T = half::bf16;
                $body
            }
            $crate::DType::F32 => {
                type $T = f32;
                $body
            }
            $crate::DType::Bool | $crate::DType::C64 => $fallback,
        }
    };
}

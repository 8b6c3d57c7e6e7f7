//! # marten-core
//!
//! Core array types shared across the Marten workspace.
//!
//! This crate provides:
//! - [`Array`] — n-dimensional array value with shared-buffer views
//! - [`Shape`] / [`Layout`] — shape, strides, offsets, and contiguity flags
//! - [`DType`] / [`WithDType`] — runtime dtype tags and the typed bridge
//! - [`Buffer`] / [`Allocator`] — reference-counted device memory with a
//!   blocking, capacity-tracked host allocator
//! - [`Error`] / [`Result`] — the single error type used workspace-wide

pub mod array;
pub mod buffer;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;

pub use array::Array;
pub use buffer::{Allocator, Buffer, HostAllocator};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use layout::{Flags, Layout};
pub use shape::Shape;

//! # kiln-core
//!
//! Core types for the Kiln GPU broker.
//!
//! Provides the `Array` device-array handle with:
//! - Shape and dtype metadata (F16, BF16, F32, F64, integer dtypes)
//! - Reference-counted CPU storage with copy-on-write mutation
//! - CUDA device storage and host↔device transfers (behind the `cuda` feature)
//! - Launch geometry (`LaunchDims`) validated against device limits before
//!   any kernel dispatch

pub mod dtype;
pub mod device;
pub mod shape;
pub mod storage;
pub mod array;
pub mod launch;
pub mod error;

pub use dtype::DType;
pub use device::Device;
pub use storage::Storage;
#[cfg(feature = "cuda")]
pub use storage::DeviceBuffer;
pub use shape::Shape;
pub use array::Array;
pub use launch::{DeviceLimits, LaunchDims};
pub use error::KilnError;

pub type Result<T> = std::result::Result<T, KilnError>;

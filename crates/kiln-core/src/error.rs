use crate::dtype::DType;

/// Errors produced by kiln-core and the backends built on it.
#[derive(Debug, thiserror::Error)]
pub enum KilnError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Matmul dimension mismatch: [{m}, {k1}] @ [{k2}, {n}] (inner dims must agree)")]
    MatmulDimMismatch { m: usize, k1: usize, k2: usize, n: usize },

    #[error("Unsupported dtype for this operation: {0}")]
    UnsupportedDType(DType),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Device mismatch: arrays live on different devices")]
    DeviceMismatch,

    #[error("Invalid launch configuration: {0}")]
    InvalidLaunch(String),

    #[error("CUDA error: {0}")]
    Cuda(String),
}

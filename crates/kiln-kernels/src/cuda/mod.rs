//! CUDA backend for Kiln.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU) and limit queries
//! - Kernel module compilation via NVRTC with per-device caching
//! - Launch dispatch validated against device limits
//! - Event-based GPU timing
//!
//! GPU allocations live in `kiln_core::storage::DeviceBuffer`; the dispatch
//! code here allocates outputs through it and wraps them back into arrays.

pub mod context;
pub mod module;
pub mod launch;
pub mod event;
pub mod ops;

pub use context::{device_count, get_device, is_cuda_available, query_limits, CudaError};
pub use event::GpuTimer;
pub use module::ModuleSpec;

//! # kiln-kernels
//!
//! Kernel execution for the Kiln GPU broker.
//!
//! Provides:
//! - Blocked CPU matmul baseline dispatching on the detected SIMD tier
//! - CUDA backend behind the `cuda` feature flag: device context registry,
//!   NVRTC module compilation with per-device caching, limit-validated
//!   kernel launches, and event-based GPU timing

pub mod simd;
pub mod cpu_matmul;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use simd::SimdTier;

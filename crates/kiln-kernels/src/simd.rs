//! Runtime CPU feature detection.
//!
//! [`SimdTier::detect`] picks the instruction set the tiled matmul in
//! [`crate::cpu_matmul`] dispatches its inner loop on. The bench prints the
//! tier so timings can be read in context.

use std::sync::OnceLock;

/// Instruction set the CPU matmul inner loop targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdTier {
    /// x86-64 with AVX2 and FMA: 8-wide fused multiply-add loop.
    Avx2Fma,
    /// AArch64. NEON is mandatory there; the scalar loop is written so the
    /// compiler autovectorizes it.
    Neon,
    /// Portable scalar fallback.
    Scalar,
}

static TIER: OnceLock<SimdTier> = OnceLock::new();

impl SimdTier {
    /// Detect the tier for the current CPU. Cached after the first call.
    pub fn detect() -> SimdTier {
        *TIER.get_or_init(|| {
            #[cfg(target_arch = "x86_64")]
            {
                if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                    SimdTier::Avx2Fma
                } else {
                    SimdTier::Scalar
                }
            }

            #[cfg(target_arch = "aarch64")]
            {
                SimdTier::Neon
            }

            #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
            {
                SimdTier::Scalar
            }
        })
    }

    /// Short human-readable label for bench output.
    pub fn name(self) -> &'static str {
        match self {
            SimdTier::Avx2Fma => "avx2+fma",
            SimdTier::Neon => "neon",
            SimdTier::Scalar => "scalar",
        }
    }
}

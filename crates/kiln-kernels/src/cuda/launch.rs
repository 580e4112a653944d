//! Validated kernel launch configuration.
//!
//! Converts broker [`LaunchDims`] into the driver's launch configuration,
//! checking the geometry against the target device's queried limits first so
//! misconfigured launches fail host-side with a descriptive error.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, LaunchConfig};
use kiln_core::{KilnError, LaunchDims};

use super::context::query_limits;

/// Convert broker launch geometry into the cudarc launch configuration.
pub fn to_cuda_config(dims: &LaunchDims) -> LaunchConfig {
    LaunchConfig {
        grid_dim: dims.grid,
        block_dim: dims.block,
        shared_mem_bytes: dims.shared_mem_bytes,
    }
}

/// Validate launch geometry against the device's limits and convert it.
///
/// Limits are queried from the driver once per device and cached. Returns
/// `KilnError::InvalidLaunch` naming the violated limit, or the driver config
/// ready to pass to `CudaFunction::launch`.
pub fn validated_config(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    dims: &LaunchDims,
) -> Result<LaunchConfig, KilnError> {
    let limits = query_limits(device, device_idx).map_err(KilnError::from)?;
    limits.validate(dims)?;
    Ok(to_cuda_config(dims))
}

//! CUDA device context management.
//!
//! Provides lazy-initialized singleton `CudaDevice` handles per GPU index and
//! cached launch-limit queries. Uses `cudarc` for safe CUDA driver API access.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::CudaDevice;
use kiln_core::{DeviceLimits, KilnError};
use parking_lot::Mutex;

/// Global registry of CUDA device handles (one per GPU index).
static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

/// Per-device launch limits queried from the driver, cached after first use.
static LIMITS: OnceLock<Mutex<HashMap<usize, DeviceLimits>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn limits_cache() -> &'static Mutex<HashMap<usize, DeviceLimits>> {
    LIMITS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create a CUDA device handle for the given GPU index.
///
/// The device is lazily initialized on first access and cached for reuse.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>, CudaError> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| CudaError::DeviceInit(format!("device {}: {}", device_idx, e)))?;
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}

/// Query the launch limits of a device from the driver. Cached per index.
pub fn query_limits(device: &Arc<CudaDevice>, device_idx: usize) -> Result<DeviceLimits, CudaError> {
    {
        let cache = limits_cache().lock();
        if let Some(lim) = cache.get(&device_idx) {
            return Ok(*lim);
        }
    }

    let attr = |a: CUdevice_attribute| -> Result<u32, CudaError> {
        let v = device
            .attribute(a)
            .map_err(|e| CudaError::DeviceInit(format!("attribute query: {}", e)))?;
        Ok(v.max(0) as u32)
    };

    let lim = DeviceLimits {
        max_threads_per_block: attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?,
        max_block_dim: (
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z)?,
        ),
        max_grid_dim: (
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Y)?,
            attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Z)?,
        ),
        max_shared_mem_per_block: attr(
            CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK,
        )?,
    };

    limits_cache().lock().insert(device_idx, lim);
    Ok(lim)
}

/// Check if any CUDA device is available.
pub fn is_cuda_available() -> bool {
    CudaDevice::new(0).is_ok()
}

/// Number of available CUDA devices.
pub fn device_count() -> usize {
    (0..16).take_while(|&i| CudaDevice::new(i).is_ok()).count()
}

/// CUDA-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("PTX compilation failed for module '{module}': {msg}")]
    PtxCompile { module: String, msg: String },

    #[error("Failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("Function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("CUDA kernel launch failed: {0}")]
    LaunchError(String),

    #[error("CUDA event error: {0}")]
    EventError(String),
}

impl From<CudaError> for KilnError {
    fn from(e: CudaError) -> Self {
        KilnError::Cuda(e.to_string())
    }
}

//! Array-level CUDA dispatch.
//!
//! Each op resolves its kernel entry point (compiling the embedded CUDA C
//! module on first use), allocates an output [`DeviceBuffer`], validates the
//! launch geometry against the device limits, launches, and wraps the result
//! buffer into a new `Array` on the same device.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync};
use kiln_core::storage::DeviceBuffer;
use kiln_core::{Array, DType, Device, KilnError, LaunchDims, Shape, Storage};

use super::context::CudaError;
use super::launch::validated_config;
use super::module::ModuleSpec;

// ============================================================================
// Embedded CUDA kernel modules
// ============================================================================

const ELEMENTWISE: ModuleSpec = ModuleSpec {
    name: "elementwise",
    source: include_str!("kernels/elementwise.cu"),
    entry_points: &["add_f32", "scale_f32"],
};

const MATMUL: ModuleSpec = ModuleSpec {
    name: "matmul",
    source: include_str!("kernels/matmul.cu"),
    entry_points: &["matmul_f32", "matmul_f32_tiled"],
};

const BLOCK_SIZE: usize = 256;

/// Side length of the shared-memory tile in `matmul_f32_tiled`.
/// Must match TILE in matmul.cu.
const MATMUL_TILE: usize = 16;

// ============================================================================
// Helpers
// ============================================================================

/// Extract (CudaDevice, device_idx, CudaSlice<u8>) from a GPU array's storage.
fn gpu_parts(t: &Array) -> Result<(Arc<CudaDevice>, usize, &CudaSlice<u8>), KilnError> {
    let dev = t
        .storage_ref()
        .cuda_device()
        .ok_or_else(|| KilnError::Cuda("array not on GPU".into()))?;
    let idx = match t.device() {
        Device::Cuda(i) => i,
        _ => return Err(KilnError::Cuda("array not on GPU".into())),
    };
    let slice = t
        .storage_ref()
        .as_cuda_slice()
        .ok_or_else(|| KilnError::Cuda("array not on GPU".into()))?;
    Ok((dev, idx, slice))
}

fn check_f32_pair(a: &Array, b: &Array) -> Result<(), KilnError> {
    if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
        return Err(KilnError::UnsupportedDType(a.dtype()));
    }
    if a.device() != b.device() {
        return Err(KilnError::DeviceMismatch);
    }
    Ok(())
}

// ============================================================================
// Element-wise ops
// ============================================================================

/// Element-wise addition of two GPU-resident f32 arrays.
pub fn add(a: &Array, b: &Array) -> Result<Array, KilnError> {
    check_f32_pair(a, b)?;
    if a.shape() != b.shape() {
        return Err(KilnError::ShapeMismatch {
            expected: a.shape().dims().to_vec(),
            got: b.shape().dims().to_vec(),
        });
    }
    let n = a.numel();
    if n == 0 {
        // Nothing to launch over; an empty array is its own sum
        return Ok(a.clone());
    }

    let (dev, idx, a_slice) = gpu_parts(a)?;
    let (_, _, b_slice) = gpu_parts(b)?;

    let f = ELEMENTWISE.entry(&dev, idx, "add_f32")?;
    let out = DeviceBuffer::zeros(dev.clone(), idx, n * 4)?;
    let cfg = validated_config(&dev, idx, &LaunchDims::linear(n, BLOCK_SIZE))?;
    unsafe {
        f.launch(cfg, (a_slice, b_slice, out.as_cuda_slice(), n as u32))
            .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    }

    let storage = Storage::from_device_buffer(out, DType::F32, n);
    Array::from_storage(storage, a.shape().clone())
}

/// Multiply a GPU-resident f32 array by a scalar.
pub fn scale(a: &Array, alpha: f32) -> Result<Array, KilnError> {
    if a.dtype() != DType::F32 {
        return Err(KilnError::UnsupportedDType(a.dtype()));
    }
    let n = a.numel();
    if n == 0 {
        return Ok(a.clone());
    }

    let (dev, idx, a_slice) = gpu_parts(a)?;

    let f = ELEMENTWISE.entry(&dev, idx, "scale_f32")?;
    let out = DeviceBuffer::zeros(dev.clone(), idx, n * 4)?;
    let cfg = validated_config(&dev, idx, &LaunchDims::linear(n, BLOCK_SIZE))?;
    unsafe {
        f.launch(cfg, (a_slice, alpha, out.as_cuda_slice(), n as u32))
            .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    }

    let storage = Storage::from_device_buffer(out, DType::F32, n);
    Array::from_storage(storage, a.shape().clone())
}

// ============================================================================
// Matrix multiplication
// ============================================================================

/// Matrix multiplication of two GPU-resident f32 arrays:
/// [M, K] @ [K, N] → [M, N].
///
/// Uses the shared-memory tiled kernel when every dimension is a nonzero
/// multiple of the tile size, the bounds-checked naive kernel otherwise.
pub fn matmul(a: &Array, b: &Array) -> Result<Array, KilnError> {
    check_f32_pair(a, b)?;

    let a_dims = a.shape().dims();
    let b_dims = b.shape().dims();
    if a_dims.len() != 2 || b_dims.len() != 2 {
        return Err(KilnError::ShapeMismatch {
            expected: vec![0, 0],
            got: a_dims.to_vec(),
        });
    }
    let (m, k) = (a_dims[0], a_dims[1]);
    let (k2, n) = (b_dims[0], b_dims[1]);
    if k != k2 {
        return Err(KilnError::MatmulDimMismatch { m, k1: k, k2, n });
    }
    if m == 0 || n == 0 {
        return Err(KilnError::InvalidLaunch(format!(
            "matmul output [{m}, {n}] has no elements"
        )));
    }

    let (dev, idx, a_slice) = gpu_parts(a)?;
    let (_, _, b_slice) = gpu_parts(b)?;

    let tiled =
        k > 0 && m % MATMUL_TILE == 0 && n % MATMUL_TILE == 0 && k % MATMUL_TILE == 0;
    let func_name = if tiled { "matmul_f32_tiled" } else { "matmul_f32" };

    let f = MATMUL.entry(&dev, idx, func_name)?;
    let out = DeviceBuffer::zeros(dev.clone(), idx, m * n * 4)?;
    let dims = LaunchDims::tiled_2d(m, n, MATMUL_TILE, MATMUL_TILE);
    let cfg = validated_config(&dev, idx, &dims)?;
    unsafe {
        f.launch(
            cfg,
            (a_slice, b_slice, out.as_cuda_slice(), m as u32, n as u32, k as u32),
        )
        .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    }

    let storage = Storage::from_device_buffer(out, DType::F32, m * n);
    Array::from_storage(storage, Shape::new(&[m, n]))
}

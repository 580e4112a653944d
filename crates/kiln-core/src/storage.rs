//! Backing storage for device arrays.
//!
//! A [`Storage`] is a reference-counted block of bytes on one device: host
//! memory, or (behind the `cuda` feature) a [`DeviceBuffer`] holding a raw
//! GPU allocation. Kernels see f32 data; the broker itself only moves bytes,
//! so the typed surface is deliberately narrow.

use std::sync::Arc;

use crate::{DType, Device, KilnError, Result};

#[cfg(feature = "cuda")]
use cudarc::driver::{CudaDevice, CudaSlice, DeviceSlice};

/// A raw GPU allocation: device handle, byte buffer, and device index.
///
/// This is the opaque device handle the launch path works with. `Storage`
/// wraps one of these for GPU-resident arrays, and kernel dispatch allocates
/// outputs through it directly. Clones share the allocation.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone)]
pub struct DeviceBuffer {
    device: Arc<CudaDevice>,
    buffer: Arc<CudaSlice<u8>>,
    device_idx: usize,
}

#[cfg(feature = "cuda")]
impl DeviceBuffer {
    /// Allocate `nbytes` of zeroed memory on `device`.
    pub fn zeros(device: Arc<CudaDevice>, device_idx: usize, nbytes: usize) -> Result<Self> {
        let buffer = device
            .alloc_zeros::<u8>(nbytes)
            .map_err(|e| KilnError::Cuda(format!("alloc_zeros({nbytes} bytes): {e}")))?;
        Ok(Self {
            device,
            buffer: Arc::new(buffer),
            device_idx,
        })
    }

    /// Stage host bytes onto `device` (H2D).
    pub fn from_host(device: Arc<CudaDevice>, device_idx: usize, bytes: &[u8]) -> Result<Self> {
        let buffer = device
            .htod_copy(bytes.to_vec())
            .map_err(|e| KilnError::Cuda(format!("H2D copy of {} bytes: {e}", bytes.len())))?;
        Ok(Self {
            device,
            buffer: Arc::new(buffer),
            device_idx,
        })
    }

    /// Read the buffer back into host memory (D2H, synchronous).
    pub fn to_host(&self) -> Result<Vec<u8>> {
        self.device
            .dtoh_sync_copy(self.buffer.as_ref())
            .map_err(|e| KilnError::Cuda(format!("D2H copy: {e}")))
    }

    /// Copy to another device. Same-index copies share the allocation;
    /// cross-device copies stage through the host.
    pub fn to_device(&self, target_idx: usize) -> Result<Self> {
        if target_idx == self.device_idx {
            return Ok(self.clone());
        }
        let staged = self.to_host()?;
        let target = CudaDevice::new(target_idx)
            .map_err(|e| KilnError::Cuda(format!("device {target_idx} init: {e}")))?;
        Self::from_host(target, target_idx, &staged)
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the allocation is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the device this buffer lives on.
    pub fn device_idx(&self) -> usize {
        self.device_idx
    }

    /// The device handle.
    pub fn device(&self) -> Arc<CudaDevice> {
        Arc::clone(&self.device)
    }

    /// The underlying slice, for passing as a kernel argument.
    pub fn as_cuda_slice(&self) -> &CudaSlice<u8> {
        &self.buffer
    }

    /// Whether no clone shares this allocation.
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.buffer) == 1
    }
}

/// Where the bytes of a [`Storage`] live.
#[derive(Debug, Clone)]
pub enum StorageData {
    /// Host heap allocation.
    Cpu(Vec<u8>),
    /// GPU allocation.
    #[cfg(feature = "cuda")]
    Cuda(DeviceBuffer),
}

/// Shared, reference-counted array storage with dtype and element count.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<StorageData>,
    dtype: DType,
    device: Device,
    numel: usize,
}

impl Storage {
    fn host(bytes: Vec<u8>, dtype: DType, numel: usize) -> Self {
        Self {
            data: Arc::new(StorageData::Cpu(bytes)),
            dtype,
            device: Device::Cpu,
            numel,
        }
    }

    /// Zeroed host storage for `numel` elements of `dtype`.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        Self::host(vec![0u8; dtype.storage_bytes(numel)], dtype, numel)
    }

    /// Host storage from raw bytes, validated against the dtype's size.
    pub fn from_bytes(dtype: DType, numel: usize, bytes: Vec<u8>) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(KilnError::StorageError(format!(
                "{numel} elements of {dtype} need {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self::host(bytes, dtype, numel))
    }

    /// Host storage from f32 values.
    pub fn from_f32(values: &[f32]) -> Self {
        let bytes = bytemuck::cast_slice(values).to_vec();
        Self::host(bytes, DType::F32, values.len())
    }

    /// The dtype of this storage.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The device this storage lives on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        match self.data.as_ref() {
            StorageData::Cpu(v) => v.len(),
            #[cfg(feature = "cuda")]
            StorageData::Cuda(buf) => buf.len(),
        }
    }

    /// Read-only view of the host bytes.
    /// Panics if the storage is GPU-resident — call `to_cpu()` first.
    pub fn as_bytes(&self) -> &[u8] {
        match self.data.as_ref() {
            StorageData::Cpu(v) => v,
            #[cfg(feature = "cuda")]
            StorageData::Cuda(_) => {
                panic!("Cannot access GPU storage as bytes — transfer to CPU first with .to_cpu()")
            }
        }
    }

    /// Mutable view of the host bytes, cloning first if the allocation is
    /// shared (copy-on-write). Panics if the storage is GPU-resident.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match Arc::make_mut(&mut self.data) {
            StorageData::Cpu(v) => v,
            #[cfg(feature = "cuda")]
            StorageData::Cuda(_) => {
                panic!("Cannot mutate GPU storage as bytes — transfer to CPU first")
            }
        }
    }

    /// Host f32 view. None unless the dtype is F32.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        (self.dtype == DType::F32).then(|| bytemuck::cast_slice(self.as_bytes()))
    }

    /// Mutable host f32 view (copy-on-write). None unless the dtype is F32.
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        Some(bytemuck::cast_slice_mut(self.as_bytes_mut()))
    }

    /// Whether this storage is uniquely owned (no other references).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }

    /// Whether this storage is on CPU.
    pub fn is_cpu(&self) -> bool {
        self.device.is_cpu()
    }

    /// Whether this storage is on a CUDA device.
    pub fn is_cuda(&self) -> bool {
        self.device.is_cuda()
    }

    /// Move this storage to a CUDA device (H2D). No-op clone if already there.
    #[cfg(feature = "cuda")]
    pub fn to_cuda(&self, device_idx: usize) -> Result<Self> {
        match self.data.as_ref() {
            StorageData::Cuda(buf) => Ok(Self {
                data: Arc::new(StorageData::Cuda(buf.to_device(device_idx)?)),
                dtype: self.dtype,
                device: Device::Cuda(device_idx),
                numel: self.numel,
            }),
            StorageData::Cpu(bytes) => {
                let dev = CudaDevice::new(device_idx)
                    .map_err(|e| KilnError::Cuda(format!("device {device_idx} init: {e}")))?;
                let buf = DeviceBuffer::from_host(dev, device_idx, bytes)?;
                Ok(Self {
                    data: Arc::new(StorageData::Cuda(buf)),
                    dtype: self.dtype,
                    device: Device::Cuda(device_idx),
                    numel: self.numel,
                })
            }
        }
    }

    /// Copy GPU storage back to the host (D2H). No-op clone if already there.
    #[cfg(feature = "cuda")]
    pub fn to_cpu(&self) -> Result<Self> {
        match self.data.as_ref() {
            StorageData::Cpu(_) => Ok(self.clone()),
            StorageData::Cuda(buf) => Ok(Self::host(buf.to_host()?, self.dtype, self.numel)),
        }
    }

    /// Wrap a device buffer as storage (used by kernel dispatch for outputs).
    #[cfg(feature = "cuda")]
    pub fn from_device_buffer(buf: DeviceBuffer, dtype: DType, numel: usize) -> Self {
        let device = Device::Cuda(buf.device_idx());
        Self {
            data: Arc::new(StorageData::Cuda(buf)),
            dtype,
            device,
            numel,
        }
    }

    /// The underlying device buffer. None if not on GPU.
    #[cfg(feature = "cuda")]
    pub fn device_buffer(&self) -> Option<&DeviceBuffer> {
        match self.data.as_ref() {
            StorageData::Cuda(buf) => Some(buf),
            _ => None,
        }
    }

    /// The underlying CudaSlice for kernel launches. None if not on GPU.
    #[cfg(feature = "cuda")]
    pub fn as_cuda_slice(&self) -> Option<&CudaSlice<u8>> {
        self.device_buffer().map(DeviceBuffer::as_cuda_slice)
    }

    /// The CudaDevice handle. None if not on GPU.
    #[cfg(feature = "cuda")]
    pub fn cuda_device(&self) -> Option<Arc<CudaDevice>> {
        self.device_buffer().map(DeviceBuffer::device)
    }
}

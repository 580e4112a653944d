use std::fmt;

use crate::dtype::DType;
use crate::device::Device;
use crate::error::KilnError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A device array handle — storage plus shape/dtype metadata.
///
/// An `Array` owns (or shares, via `clone`) a block of memory on a specific
/// device together with the metadata needed to launch kernels against it.
/// Host data is staged with the typed constructors and moved to a GPU with
/// [`Array::cuda`]; results come back with [`Array::cpu`].
///
/// # Examples
///
/// ```
/// use kiln_core::Array;
///
/// let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// assert_eq!(a.shape().dims(), &[2, 2]);
/// assert_eq!(a.numel(), 4);
///
/// // Reshape (shares storage)
/// let flat = a.reshape(&[4]).unwrap();
/// assert_eq!(flat.shape().dims(), &[4]);
/// ```
#[derive(Clone)]
pub struct Array {
    storage: Storage,
    shape: Shape,
}

impl Array {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an array from f32 data with the given shape.
    ///
    /// # Panics
    /// Panics if `shape` does not describe exactly `data.len()` elements.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "Shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        Self {
            storage: Storage::from_f32(data),
            shape: s,
        }
    }

    /// Create a zeroed array with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        Self {
            storage: Storage::zeros(dtype, s.numel()),
            shape: s,
        }
    }

    /// Create an f32 array of ones.
    pub fn ones(shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        let data = vec![1.0f32; s.numel()];
        Self::from_f32(&data, shape)
    }

    /// Wrap existing storage with a shape.
    /// Returns an error if the shape's element count disagrees with the storage.
    pub fn from_storage(storage: Storage, shape: Shape) -> Result<Self> {
        if storage.numel() != shape.numel() {
            return Err(KilnError::ShapeMismatch {
                expected: vec![storage.numel()],
                got: shape.dims().to_vec(),
            });
        }
        Ok(Self { storage, shape })
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// The shape of this array.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The dtype of this array.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// The device this array lives on.
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Size of the backing allocation in bytes.
    pub fn nbytes(&self) -> usize {
        self.storage.nbytes()
    }

    /// Whether this array is on CPU.
    pub fn is_cpu(&self) -> bool {
        self.storage.is_cpu()
    }

    /// Whether this array is on a CUDA device.
    pub fn is_cuda(&self) -> bool {
        self.storage.is_cuda()
    }

    /// The backing storage.
    pub fn storage_ref(&self) -> &Storage {
        &self.storage
    }

    // =========================================================================
    // Shape manipulation
    // =========================================================================

    /// Reshape to a new shape, sharing storage.
    /// One dimension may be -1 (inferred from the element count).
    pub fn reshape(&self, target: &[isize]) -> Result<Self> {
        let new_shape = self
            .shape
            .resolve_reshape(target)
            .ok_or_else(|| KilnError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: target.iter().map(|&d| d.max(0) as usize).collect(),
            })?;
        Ok(Self {
            storage: self.storage.clone(),
            shape: new_shape,
        })
    }

    // =========================================================================
    // Host views
    // =========================================================================

    /// View the host data as f32. None if not F32 dtype.
    /// Panics if the array is GPU-resident — call `.cpu()` first.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        self.storage.as_f32_slice()
    }

    // =========================================================================
    // Device transfers
    // =========================================================================

    /// Move this array to the given CUDA device (H2D copy).
    /// A no-op clone if the array is already on that device.
    #[cfg(feature = "cuda")]
    pub fn cuda(&self, device_idx: usize) -> Result<Self> {
        Ok(Self {
            storage: self.storage.to_cuda(device_idx)?,
            shape: self.shape.clone(),
        })
    }

    /// Move this array back to the CPU (D2H copy).
    /// A no-op clone if the array is already on CPU.
    #[cfg(feature = "cuda")]
    pub fn cpu(&self) -> Result<Self> {
        Ok(Self {
            storage: self.storage.to_cpu()?,
            shape: self.shape.clone(),
        })
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("shape", &self.shape)
            .field("dtype", &self.dtype())
            .field("device", &self.device())
            .finish()
    }
}

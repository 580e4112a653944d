//! Event-based GPU timing.
//!
//! Wraps a pair of CUDA events around kernel work on the default stream.
//! Unlike host-side `Instant` timing, the elapsed query measures device
//! execution between the two records, not host call overhead.

use std::sync::Arc;

use cudarc::driver::sys;
use cudarc::driver::CudaDevice;

use super::context::CudaError;

/// A start/stop CUDA event pair for timing device work.
///
/// Usage: `record_start` → enqueue kernels → `record_stop` → `synchronize` →
/// `elapsed_ms`. Events are destroyed on drop.
pub struct GpuTimer {
    device: Arc<CudaDevice>,
    start: sys::CUevent,
    stop: sys::CUevent,
}

impl GpuTimer {
    /// Create a timer on the given device.
    pub fn new(device: Arc<CudaDevice>) -> Result<Self, CudaError> {
        device
            .bind_to_thread()
            .map_err(|e| CudaError::EventError(format!("bind context: {}", e)))?;
        let start = cudarc::driver::result::event::create(sys::CUevent_flags::CU_EVENT_DEFAULT)
            .map_err(|e| CudaError::EventError(format!("create start event: {}", e)))?;
        let stop = cudarc::driver::result::event::create(sys::CUevent_flags::CU_EVENT_DEFAULT)
            .map_err(|e| CudaError::EventError(format!("create stop event: {}", e)))?;
        Ok(Self { device, start, stop })
    }

    /// Record the start event on the default stream.
    pub fn record_start(&self) -> Result<(), CudaError> {
        // Safety: event and the null (default) stream belong to the bound context
        unsafe {
            cudarc::driver::result::event::record(self.start, std::ptr::null_mut())
                .map_err(|e| CudaError::EventError(format!("record start: {}", e)))
        }
    }

    /// Record the stop event on the default stream.
    pub fn record_stop(&self) -> Result<(), CudaError> {
        // Safety: as above
        unsafe {
            cudarc::driver::result::event::record(self.stop, std::ptr::null_mut())
                .map_err(|e| CudaError::EventError(format!("record stop: {}", e)))
        }
    }

    /// Block the host until all work recorded so far has completed.
    pub fn synchronize(&self) -> Result<(), CudaError> {
        self.device
            .synchronize()
            .map_err(|e| CudaError::EventError(format!("synchronize: {}", e)))
    }

    /// Elapsed device time between the start and stop records, in
    /// milliseconds. Call [`GpuTimer::synchronize`] first.
    pub fn elapsed_ms(&self) -> Result<f32, CudaError> {
        // Safety: both events were created on this device's context
        unsafe {
            cudarc::driver::result::event::elapsed(self.start, self.stop)
                .map_err(|e| CudaError::EventError(format!("elapsed query: {}", e)))
        }
    }
}

impl Drop for GpuTimer {
    fn drop(&mut self) {
        // Safety: events are valid until this drop; errors on teardown are ignored
        unsafe {
            let _ = cudarc::driver::result::event::destroy(self.start);
            let _ = cudarc::driver::result::event::destroy(self.stop);
        }
    }
}

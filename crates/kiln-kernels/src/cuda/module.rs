//! Kernel modules: embedded CUDA C source with named entry points.
//!
//! A [`ModuleSpec`] bundles a module name, its source, and the entry points
//! it exports. [`ModuleSpec::entry`] resolves a kernel, compiling the source
//! through NVRTC and loading the PTX the first time the module is used on a
//! device.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use cudarc::driver::{CudaDevice, CudaFunction};
use parking_lot::Mutex;

use super::context::CudaError;

/// An inline CUDA C module and the kernels it exports.
///
/// Declared as a `const` next to the dispatch code that launches from it.
/// Only names listed in `entry_points` are resolvable; `load_ptx` registers
/// exactly those symbols.
pub struct ModuleSpec {
    pub name: &'static str,
    pub source: &'static str,
    pub entry_points: &'static [&'static str],
}

/// Modules already compiled and loaded, keyed by (device_idx, module name).
static LOADED: OnceLock<Mutex<HashSet<(usize, &'static str)>>> = OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, &'static str)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

impl ModuleSpec {
    /// Resolve `func_name` on `device`, compiling and loading this module on
    /// first use. Subsequent calls hit the driver's loaded-module lookup.
    pub fn entry(
        &self,
        device: &Arc<CudaDevice>,
        device_idx: usize,
        func_name: &str,
    ) -> Result<CudaFunction, CudaError> {
        if let Some(f) = device.get_func(self.name, func_name) {
            return Ok(f);
        }
        if !self.entry_points.iter().any(|&e| e == func_name) {
            return Err(CudaError::FuncNotFound {
                module: self.name.to_string(),
                func: func_name.to_string(),
            });
        }

        // Hold the lock across compile+load so a racing thread doesn't
        // compile the same module twice.
        let mut loaded = loaded_set().lock();
        if !loaded.contains(&(device_idx, self.name)) {
            let ptx = cudarc::nvrtc::compile_ptx(self.source).map_err(|e| CudaError::PtxCompile {
                module: self.name.to_string(),
                msg: e.to_string(),
            })?;
            device
                .load_ptx(ptx, self.name, self.entry_points)
                .map_err(|e| CudaError::ModuleLoad {
                    module: self.name.to_string(),
                    msg: e.to_string(),
                })?;
            loaded.insert((device_idx, self.name));
        }
        drop(loaded);

        device
            .get_func(self.name, func_name)
            .ok_or_else(|| CudaError::FuncNotFound {
                module: self.name.to_string(),
                func: func_name.to_string(),
            })
    }
}

//! Kernel launch geometry and device-limit validation.
//!
//! A [`LaunchDims`] describes the grid/block configuration of one kernel
//! invocation. Configurations are checked against [`DeviceLimits`] before
//! dispatch, so an oversized block is rejected host-side with a message
//! naming the offending axis instead of a bare driver invalid-argument code.

use std::fmt;

use crate::error::KilnError;
use crate::Result;

/// Grid/block geometry for a single kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDims {
    /// Number of thread blocks along (x, y, z).
    pub grid: (u32, u32, u32),
    /// Threads per block along (x, y, z).
    pub block: (u32, u32, u32),
    /// Dynamic shared memory per block, in bytes.
    pub shared_mem_bytes: u32,
}

impl LaunchDims {
    /// 1-D launch covering `n` elements with the given block size.
    /// The grid is the ceiling division of `n` by `block_size`.
    /// A zero block size is clamped to 1 in both the block and the grid math.
    pub fn linear(n: usize, block_size: usize) -> Self {
        let bs = block_size.max(1);
        let grid = (n + bs - 1) / bs;
        Self {
            grid: (grid as u32, 1, 1),
            block: (bs as u32, 1, 1),
            shared_mem_bytes: 0,
        }
    }

    /// 2-D launch covering a `rows` × `cols` domain with `block_x` × `block_y`
    /// thread blocks. x indexes columns, y indexes rows (CUDA convention).
    pub fn tiled_2d(rows: usize, cols: usize, block_x: usize, block_y: usize) -> Self {
        let bx = block_x.max(1);
        let by = block_y.max(1);
        let grid_x = (cols + bx - 1) / bx;
        let grid_y = (rows + by - 1) / by;
        Self {
            grid: (grid_x as u32, grid_y as u32, 1),
            block: (bx as u32, by as u32, 1),
            shared_mem_bytes: 0,
        }
    }

    /// Same geometry with a dynamic shared memory request.
    pub fn with_shared_mem(mut self, bytes: u32) -> Self {
        self.shared_mem_bytes = bytes;
        self
    }

    /// Threads in one block (product of the block axes).
    pub fn threads_per_block(&self) -> u64 {
        self.block.0 as u64 * self.block.1 as u64 * self.block.2 as u64
    }

    /// Blocks in the grid (product of the grid axes).
    pub fn total_blocks(&self) -> u64 {
        self.grid.0 as u64 * self.grid.1 as u64 * self.grid.2 as u64
    }

    /// Total threads across the whole launch.
    pub fn total_threads(&self) -> u64 {
        self.total_blocks() * self.threads_per_block()
    }
}

impl fmt::Display for LaunchDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid ({}, {}, {}) x block ({}, {}, {})",
            self.grid.0, self.grid.1, self.grid.2, self.block.0, self.block.1, self.block.2
        )?;
        if self.shared_mem_bytes > 0 {
            write!(f, " + {} B shared", self.shared_mem_bytes)?;
        }
        Ok(())
    }
}

/// Per-device launch limits, queried from the driver or defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum threads in a single block (product over axes).
    pub max_threads_per_block: u32,
    /// Maximum block size along (x, y, z).
    pub max_block_dim: (u32, u32, u32),
    /// Maximum grid size along (x, y, z).
    pub max_grid_dim: (u32, u32, u32),
    /// Maximum shared memory per block, in bytes.
    pub max_shared_mem_per_block: u32,
}

impl Default for DeviceLimits {
    /// The documented limits common to every CUDA compute capability ≥ 3.5.
    fn default() -> Self {
        Self {
            max_threads_per_block: 1024,
            max_block_dim: (1024, 1024, 64),
            max_grid_dim: (2_147_483_647, 65_535, 65_535),
            max_shared_mem_per_block: 48 * 1024,
        }
    }
}

impl DeviceLimits {
    /// Validate a launch configuration against these limits.
    ///
    /// Rejects zero-sized axes, per-axis block/grid overruns, a block thread
    /// product above `max_threads_per_block`, and oversized shared memory.
    /// The error message names the offending axis and the limit.
    pub fn validate(&self, dims: &LaunchDims) -> Result<()> {
        let (gx, gy, gz) = dims.grid;
        let (bx, by, bz) = dims.block;

        if gx == 0 || gy == 0 || gz == 0 {
            return Err(KilnError::InvalidLaunch(format!(
                "grid dimensions must be nonzero, got ({gx}, {gy}, {gz})"
            )));
        }
        if bx == 0 || by == 0 || bz == 0 {
            return Err(KilnError::InvalidLaunch(format!(
                "block dimensions must be nonzero, got ({bx}, {by}, {bz})"
            )));
        }

        let block_axes = [("block.x", bx, self.max_block_dim.0),
            ("block.y", by, self.max_block_dim.1),
            ("block.z", bz, self.max_block_dim.2)];
        for (name, val, limit) in block_axes {
            if val > limit {
                return Err(KilnError::InvalidLaunch(format!(
                    "{name} = {val} exceeds the device limit of {limit}"
                )));
            }
        }

        let threads = dims.threads_per_block();
        if threads > self.max_threads_per_block as u64 {
            return Err(KilnError::InvalidLaunch(format!(
                "block ({bx}, {by}, {bz}) has {threads} threads, device allows at most {} per block",
                self.max_threads_per_block
            )));
        }

        let grid_axes = [("grid.x", gx, self.max_grid_dim.0),
            ("grid.y", gy, self.max_grid_dim.1),
            ("grid.z", gz, self.max_grid_dim.2)];
        for (name, val, limit) in grid_axes {
            if val > limit {
                return Err(KilnError::InvalidLaunch(format!(
                    "{name} = {val} exceeds the device limit of {limit}"
                )));
            }
        }

        if dims.shared_mem_bytes > self.max_shared_mem_per_block {
            return Err(KilnError::InvalidLaunch(format!(
                "shared memory request of {} bytes exceeds the per-block limit of {}",
                dims.shared_mem_bytes, self.max_shared_mem_per_block
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_geometry() {
        let d = LaunchDims::linear(1000, 256);
        assert_eq!(d.grid, (4, 1, 1));
        assert_eq!(d.block, (256, 1, 1));
        assert_eq!(d.threads_per_block(), 256);
        assert_eq!(d.total_threads(), 1024);

        // Exact multiple
        let d = LaunchDims::linear(512, 256);
        assert_eq!(d.grid, (2, 1, 1));
    }

    #[test]
    fn test_degenerate_geometry() {
        // Zero block size is clamped consistently, not stored as 0
        let d = LaunchDims::linear(10, 0);
        assert_eq!(d.block, (1, 1, 1));
        assert_eq!(d.grid, (10, 1, 1));

        // Zero elements yields an empty grid; callers skip the launch instead
        let d = LaunchDims::linear(0, 256);
        assert_eq!(d.grid, (0, 1, 1));
        assert!(DeviceLimits::default().validate(&d).is_err());

        let d = LaunchDims::tiled_2d(5, 7, 0, 0);
        assert_eq!(d.block, (1, 1, 1));
        assert_eq!(d.grid, (7, 5, 1));
    }

    #[test]
    fn test_tiled_2d_geometry() {
        let d = LaunchDims::tiled_2d(100, 200, 16, 16);
        assert_eq!(d.grid, (13, 7, 1));
        assert_eq!(d.block, (16, 16, 1));
        assert_eq!(d.threads_per_block(), 256);
    }

    #[test]
    fn test_shared_mem_builder() {
        let d = LaunchDims::linear(64, 64).with_shared_mem(2048);
        assert_eq!(d.shared_mem_bytes, 2048);
        assert!(format!("{}", d).contains("2048 B shared"));
    }

    #[test]
    fn test_valid_configs_pass() {
        let limits = DeviceLimits::default();
        assert!(limits.validate(&LaunchDims::linear(1 << 20, 256)).is_ok());
        assert!(limits.validate(&LaunchDims::tiled_2d(4096, 4096, 32, 32)).is_ok());
        assert!(limits
            .validate(&LaunchDims::tiled_2d(64, 64, 16, 16).with_shared_mem(48 * 1024))
            .is_ok());
    }

    #[test]
    fn test_oversized_block_rejected() {
        // A 1024x1024 block is legal per-axis but far beyond 1024 threads total.
        let limits = DeviceLimits::default();
        let d = LaunchDims::tiled_2d(4096, 4096, 1024, 1024);
        let err = limits.validate(&d).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("1048576 threads"), "got: {msg}");
        assert!(msg.contains("1024 per block"), "got: {msg}");
    }

    #[test]
    fn test_per_axis_block_limit() {
        let limits = DeviceLimits::default();
        let d = LaunchDims {
            grid: (1, 1, 1),
            block: (1, 1, 128), // z axis capped at 64
            shared_mem_bytes: 0,
        };
        let msg = limits.validate(&d).unwrap_err().to_string();
        assert!(msg.contains("block.z"), "got: {msg}");
    }

    #[test]
    fn test_grid_limit() {
        let limits = DeviceLimits::default();
        let d = LaunchDims {
            grid: (1, 70_000, 1),
            block: (64, 1, 1),
            shared_mem_bytes: 0,
        };
        let msg = limits.validate(&d).unwrap_err().to_string();
        assert!(msg.contains("grid.y"), "got: {msg}");
    }

    #[test]
    fn test_zero_dims_rejected() {
        let limits = DeviceLimits::default();
        let d = LaunchDims {
            grid: (0, 1, 1),
            block: (64, 1, 1),
            shared_mem_bytes: 0,
        };
        assert!(limits.validate(&d).is_err());

        let d = LaunchDims {
            grid: (1, 1, 1),
            block: (64, 0, 1),
            shared_mem_bytes: 0,
        };
        assert!(limits.validate(&d).is_err());
    }

    #[test]
    fn test_shared_mem_limit() {
        let limits = DeviceLimits::default();
        let d = LaunchDims::linear(64, 64).with_shared_mem(48 * 1024 + 1);
        let msg = limits.validate(&d).unwrap_err().to_string();
        assert!(msg.contains("shared memory"), "got: {msg}");
    }
}

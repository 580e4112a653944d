//! GPU integration tests for the Kiln CUDA backend.
//! Run with: cargo test -p kiln-kernels --features cuda -- --nocapture

#![cfg(feature = "cuda")]

use kiln_core::{Array, Device, KilnError, LaunchDims};
use kiln_kernels::cpu_matmul::naive_matmul_f32;
use kiln_kernels::cuda::{self, GpuTimer};

fn assert_close(a: &[f32], b: &[f32], tol: f32) {
    assert_eq!(a.len(), b.len(), "length mismatch: {} vs {}", a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert!(
            (x - y).abs() < tol,
            "element {} differs: {} vs {} (tol={})",
            i, x, y, tol
        );
    }
}

// ============================================================================
// Device transfer tests
// ============================================================================

#[test]
fn test_cpu_to_cuda_roundtrip() {
    let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
    let cpu_array = Array::from_f32(&data, &[2, 3]);
    assert!(cpu_array.is_cpu());

    let gpu_array = cpu_array.cuda(0).expect("Failed to move to GPU");
    assert!(gpu_array.is_cuda());
    assert_eq!(gpu_array.device(), Device::Cuda(0));
    assert_eq!(gpu_array.shape().dims(), &[2, 3]);

    let back = gpu_array.cpu().expect("Failed to move back to CPU");
    assert!(back.is_cpu());
    assert_eq!(back.as_f32_slice().unwrap(), &data);
}

#[test]
fn test_raw_buffer_roundtrip() {
    use kiln_core::DeviceBuffer;

    let dev = cuda::get_device(0).unwrap();

    let zeroed = DeviceBuffer::zeros(dev.clone(), 0, 16).unwrap();
    assert_eq!(zeroed.len(), 16);
    assert!(!zeroed.is_empty());
    assert!(zeroed.to_host().unwrap().iter().all(|&b| b == 0));

    let bytes: Vec<u8> = (0..64).collect();
    let buf = DeviceBuffer::from_host(dev, 0, &bytes).unwrap();
    assert_eq!(buf.device_idx(), 0);
    assert_eq!(buf.to_host().unwrap(), bytes);

    // Same-device copy shares the allocation
    let copied = buf.to_device(0).unwrap();
    assert!(!buf.is_unique());
    assert_eq!(copied.to_host().unwrap(), bytes);
}

#[test]
fn test_cuda_noop_transfer() {
    let t = Array::from_f32(&[1.0, 2.0], &[2]);
    let gpu = t.cuda(0).unwrap();
    let gpu2 = gpu.cuda(0).unwrap(); // should be no-op
    assert!(gpu2.is_cuda());
}

// ============================================================================
// Element-wise ops
// ============================================================================

#[test]
fn test_cuda_add() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0], &[4]).cuda(0).unwrap();
    let b = Array::from_f32(&[5.0, 6.0, 7.0, 8.0], &[4]).cuda(0).unwrap();
    let c = cuda::ops::add(&a, &b).unwrap();
    assert!(c.is_cuda());
    let result = c.cpu().unwrap();
    assert_eq!(result.as_f32_slice().unwrap(), &[6.0, 8.0, 10.0, 12.0]);
}

#[test]
fn test_cuda_add_shape_mismatch() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0], &[4]).cuda(0).unwrap();
    let b = Array::from_f32(&[1.0, 2.0], &[2]).cuda(0).unwrap();
    assert!(cuda::ops::add(&a, &b).is_err());
}

#[test]
fn test_zero_element_ops() {
    // Ops on zero-element arrays skip the launch and hand back an empty
    // result instead of tripping the grid validation
    let a = Array::from_f32(&[], &[0]);
    let b = Array::from_f32(&[], &[0]);

    let sum = cuda::ops::add(&a, &b).unwrap();
    assert_eq!(sum.numel(), 0);
    assert_eq!(sum.shape().dims(), &[0]);

    let scaled = cuda::ops::scale(&a, 4.0).unwrap();
    assert_eq!(scaled.numel(), 0);

    // A matmul with an empty output is rejected with a descriptive error
    let a = Array::from_f32(&[], &[0, 3]);
    let b = Array::from_f32(&[1.0, 2.0, 3.0], &[3, 1]);
    let err = cuda::ops::matmul(&a, &b).unwrap_err();
    assert!(matches!(err, KilnError::InvalidLaunch(_)));
    assert!(err.to_string().contains("no elements"), "got: {err}");
}

#[test]
fn test_cuda_scale() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0], &[4]).cuda(0).unwrap();
    let c = cuda::ops::scale(&a, 3.0).unwrap();
    let result = c.cpu().unwrap();
    assert_eq!(result.as_f32_slice().unwrap(), &[3.0, 6.0, 9.0, 12.0]);
}

// ============================================================================
// Matrix multiplication
// ============================================================================

#[test]
fn test_cuda_matmul_small() {
    // [2,3] @ [3,2] → [2,2], exercises the bounds-checked naive kernel
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).cuda(0).unwrap();
    let b = Array::from_f32(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]).cuda(0).unwrap();
    let c = cuda::ops::matmul(&a, &b).unwrap();
    assert!(c.is_cuda());
    assert_eq!(c.shape().dims(), &[2, 2]);
    let result = c.cpu().unwrap();
    assert_eq!(result.as_f32_slice().unwrap(), &[58.0, 64.0, 139.0, 154.0]);
}

#[test]
fn test_cuda_matmul_tiled() {
    // 64x64 — every dim a multiple of 16, exercises the tiled kernel
    let n = 64;
    let a_data: Vec<f32> = (0..n * n).map(|i| (i % 7) as f32 * 0.1).collect();
    let b_data: Vec<f32> = (0..n * n).map(|i| (i % 11) as f32 * 0.1).collect();

    let a_cpu = Array::from_f32(&a_data, &[n, n]);
    let b_cpu = Array::from_f32(&b_data, &[n, n]);
    let c_cpu = naive_matmul_f32(&a_cpu, &b_cpu).unwrap();

    let a_gpu = a_cpu.cuda(0).unwrap();
    let b_gpu = b_cpu.cuda(0).unwrap();
    let c_gpu = cuda::ops::matmul(&a_gpu, &b_gpu).unwrap().cpu().unwrap();

    assert_close(
        c_cpu.as_f32_slice().unwrap(),
        c_gpu.as_f32_slice().unwrap(),
        1e-3,
    );
}

#[test]
fn test_cuda_matmul_ragged() {
    // 100x60 @ 60x90 — not tile-aligned, falls back to the naive kernel
    let (m, k, n) = (100, 60, 90);
    let a_data: Vec<f32> = (0..m * k).map(|i| ((i % 13) as f32 - 6.0) * 0.01).collect();
    let b_data: Vec<f32> = (0..k * n).map(|i| ((i % 17) as f32 - 8.0) * 0.01).collect();

    let a_cpu = Array::from_f32(&a_data, &[m, k]);
    let b_cpu = Array::from_f32(&b_data, &[k, n]);
    let c_cpu = naive_matmul_f32(&a_cpu, &b_cpu).unwrap();

    let a_gpu = a_cpu.cuda(0).unwrap();
    let b_gpu = b_cpu.cuda(0).unwrap();
    let c_gpu = cuda::ops::matmul(&a_gpu, &b_gpu).unwrap().cpu().unwrap();

    assert_close(
        c_cpu.as_f32_slice().unwrap(),
        c_gpu.as_f32_slice().unwrap(),
        1e-2,
    );
}

// ============================================================================
// Launch validation
// ============================================================================

#[test]
fn test_oversized_block_rejected_before_dispatch() {
    let dev = cuda::get_device(0).unwrap();
    let limits = cuda::query_limits(&dev, 0).unwrap();

    // A block bigger than any device allows
    let dims = LaunchDims {
        grid: (1, 1, 1),
        block: (1024, 1024, 1),
        shared_mem_bytes: 0,
    };
    let err = limits.validate(&dims).unwrap_err();
    assert!(matches!(err, KilnError::InvalidLaunch(_)));
    assert!(err.to_string().contains("per block"), "got: {err}");
}

#[test]
fn test_queried_limits_are_sane() {
    let dev = cuda::get_device(0).unwrap();
    let limits = cuda::query_limits(&dev, 0).unwrap();
    assert!(limits.max_threads_per_block >= 512);
    assert!(limits.max_block_dim.0 >= 512);
    assert!(limits.max_grid_dim.0 > 0);
    assert!(limits.max_shared_mem_per_block >= 16 * 1024);
}

// ============================================================================
// Event timing
// ============================================================================

#[test]
fn test_gpu_timer() {
    let dev = cuda::get_device(0).unwrap();
    let timer = GpuTimer::new(dev).unwrap();

    let a = Array::from_f32(&vec![1.0; 1 << 16], &[1 << 16]).cuda(0).unwrap();
    let b = Array::from_f32(&vec![2.0; 1 << 16], &[1 << 16]).cuda(0).unwrap();

    timer.record_start().unwrap();
    let c = cuda::ops::add(&a, &b).unwrap();
    timer.record_stop().unwrap();
    timer.synchronize().unwrap();

    let ms = timer.elapsed_ms().unwrap();
    assert!(ms >= 0.0);
    assert_eq!(c.cpu().unwrap().as_f32_slice().unwrap()[0], 3.0);
}

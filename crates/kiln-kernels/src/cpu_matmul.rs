//! CPU matrix multiplication baselines.
//!
//! `naive_matmul_f32` is the reference triple loop the GPU results are checked
//! against. `matmul_f32` blocks the row and depth loops for cache reuse and
//! dispatches its inner loop on the detected [`SimdTier`].

use kiln_core::{Array, DType, KilnError};

use crate::simd::SimdTier;

/// Rows of C processed per block. Keeps a ROW_BLOCK × K_PANEL slab of A and
/// the touched rows of B resident in cache across the j sweep.
const ROW_BLOCK: usize = 32;
/// Depth of the K panel walked per block.
const K_PANEL: usize = 128;

fn check_matmul_dims(a: &Array, b: &Array) -> Result<(usize, usize, usize), KilnError> {
    if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
        return Err(KilnError::UnsupportedDType(a.dtype()));
    }

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
    Ok((m, n, k))
}

/// Reference 2D matrix multiplication: C = A @ B, [M, K] @ [K, N] → [M, N].
///
/// Plain triple loop, no blocking. Used as the correctness baseline.
pub fn naive_matmul_f32(a: &Array, b: &Array) -> Result<Array, KilnError> {
    let (m, n, k) = check_matmul_dims(a, b)?;

    let a_data = a.as_f32_slice().ok_or(KilnError::UnsupportedDType(a.dtype()))?;
    let b_data = b.as_f32_slice().ok_or(KilnError::UnsupportedDType(b.dtype()))?;
    let mut c_data = vec![0.0f32; m * n];

    for i in 0..m {
        for p in 0..k {
            let a_val = a_data[i * k + p];
            for j in 0..n {
                c_data[i * n + j] += a_val * b_data[p * n + j];
            }
        }
    }

    Ok(Array::from_f32(&c_data, &[m, n]))
}

/// Blocked 2D matrix multiplication: C = A @ B, [M, K] @ [K, N] → [M, N].
///
/// Same result as [`naive_matmul_f32`], computed with row/depth blocking and
/// a SIMD inner loop chosen by [`SimdTier::detect`].
pub fn matmul_f32(a: &Array, b: &Array) -> Result<Array, KilnError> {
    let (m, n, k) = check_matmul_dims(a, b)?;

    let a_data = a.as_f32_slice().ok_or(KilnError::UnsupportedDType(a.dtype()))?;
    let b_data = b.as_f32_slice().ok_or(KilnError::UnsupportedDType(b.dtype()))?;
    let mut c_data = vec![0.0f32; m * n];

    run_blocked(a_data, b_data, &mut c_data, m, n, k);

    Ok(Array::from_f32(&c_data, &[m, n]))
}

fn run_blocked(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    match SimdTier::detect() {
        #[cfg(target_arch = "x86_64")]
        // Safety: detect() verified avx2 and fma are present
        SimdTier::Avx2Fma => unsafe { blocked_avx2(a, b, c, m, n, k) },
        _ => blocked_scalar(a, b, c, m, n, k),
    }
}

/// Portable inner loop. The j sweep is a straight axpy over contiguous rows,
/// which NEON and SSE autovectorize.
fn blocked_scalar(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    for i0 in (0..m).step_by(ROW_BLOCK) {
        for p0 in (0..k).step_by(K_PANEL) {
            let p_end = (p0 + K_PANEL).min(k);
            for i in i0..(i0 + ROW_BLOCK).min(m) {
                let c_row = &mut c[i * n..(i + 1) * n];
                for p in p0..p_end {
                    let a_ip = a[i * k + p];
                    let b_row = &b[p * n..(p + 1) * n];
                    for (cv, &bv) in c_row.iter_mut().zip(b_row) {
                        *cv += a_ip * bv;
                    }
                }
            }
        }
    }
}

/// AVX2+FMA inner loop: two 256-bit accumulators per iteration (16 floats),
/// then an 8-wide pass, then a scalar tail for the last n % 8 columns.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
unsafe fn blocked_avx2(a: &[f32], b: &[f32], c: &mut [f32], m: usize, n: usize, k: usize) {
    use std::arch::x86_64::*;

    for i0 in (0..m).step_by(ROW_BLOCK) {
        for p0 in (0..k).step_by(K_PANEL) {
            let p_end = (p0 + K_PANEL).min(k);
            for i in i0..(i0 + ROW_BLOCK).min(m) {
                let c_row = c.as_mut_ptr().add(i * n);
                for p in p0..p_end {
                    let a_ip = a[i * k + p];
                    let va = _mm256_set1_ps(a_ip);
                    let b_row = b.as_ptr().add(p * n);

                    let mut j = 0;
                    while j + 16 <= n {
                        let lo = _mm256_fmadd_ps(
                            va,
                            _mm256_loadu_ps(b_row.add(j)),
                            _mm256_loadu_ps(c_row.add(j)),
                        );
                        let hi = _mm256_fmadd_ps(
                            va,
                            _mm256_loadu_ps(b_row.add(j + 8)),
                            _mm256_loadu_ps(c_row.add(j + 8)),
                        );
                        _mm256_storeu_ps(c_row.add(j), lo);
                        _mm256_storeu_ps(c_row.add(j + 8), hi);
                        j += 16;
                    }
                    if j + 8 <= n {
                        let v = _mm256_fmadd_ps(
                            va,
                            _mm256_loadu_ps(b_row.add(j)),
                            _mm256_loadu_ps(c_row.add(j)),
                        );
                        _mm256_storeu_ps(c_row.add(j), v);
                        j += 8;
                    }
                    while j < n {
                        *c_row.add(j) += a_ip * *b_row.add(j);
                        j += 1;
                    }
                }
            }
        }
    }
}

use crate::backend::ComputeBackend;
use crate::device::DeviceKind;
use crate::error::{ComputeError, Result};

use rayon::prelude::*;

/// Pure-Rust host backend.
///
/// Matrix multiplications are parallelized over output rows on a rayon
/// thread pool; everything else is a straightforward loop. Intended as the
/// reference implementation and the fallback for layers an accelerator
/// cannot hold.
#[derive(Debug)]
pub struct CpuBackend {
    /// Dedicated pool when an explicit thread count was requested;
    /// `None` uses rayon's global pool (the system default).
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a backend using the system-default level of parallelism.
    pub fn new() -> Self {
        CpuBackend { pool: None }
    }

    /// Create a backend with an explicit worker count. `0` means the
    /// system default.
    pub fn with_threads(n_threads: usize) -> Result<Self> {
        if n_threads == 0 {
            return Ok(Self::new());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(CpuBackend { pool: Some(pool) })
    }

    fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_same_len(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(ComputeError::LengthMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(())
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn device(&self) -> DeviceKind {
        DeviceKind::Host
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        if a.len() != m * k || b.len() != k * n {
            return Err(ComputeError::MatmulMismatch {
                a_len: a.len(),
                b_len: b.len(),
                m,
                k,
                n,
            });
        }

        let mut c = vec![0.0f32; m * n];
        self.install(|| {
            c.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                let a_row = &a[i * k..(i + 1) * k];
                for (j, out) in row.iter_mut().enumerate() {
                    let mut sum = 0.0f32;
                    for (p, &av) in a_row.iter().enumerate() {
                        sum += av * b[p * n + j];
                    }
                    *out = sum;
                }
            });
        });
        Ok(c)
    }

    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        check_same_len(a, b)?;
        Ok(a.iter().zip(b).map(|(x, y)| x + y).collect())
    }

    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        check_same_len(a, b)?;
        Ok(a.iter().zip(b).map(|(x, y)| x * y).collect())
    }

    fn rms_norm(
        &self,
        x: &[f32],
        weight: &[f32],
        eps: f32,
        hidden_size: usize,
    ) -> Result<Vec<f32>> {
        if weight.len() != hidden_size {
            return Err(ComputeError::LengthMismatch {
                expected: hidden_size,
                got: weight.len(),
            });
        }
        if hidden_size == 0 || x.len() % hidden_size != 0 {
            return Err(ComputeError::Other(format!(
                "rms_norm: x.len()={} is not a multiple of hidden_size={}",
                x.len(),
                hidden_size
            )));
        }

        let mut result = vec![0.0f32; x.len()];
        for (row, out) in x.chunks_exact(hidden_size).zip(result.chunks_exact_mut(hidden_size)) {
            let mean_sq: f32 = row.iter().map(|v| v * v).sum::<f32>() / hidden_size as f32;
            let rms = (mean_sq + eps).sqrt();
            for i in 0..hidden_size {
                out[i] = row[i] * weight[i] / rms;
            }
        }
        Ok(result)
    }

    fn softmax(&self, x: &[f32], chunk: usize) -> Result<Vec<f32>> {
        if chunk == 0 || x.len() % chunk != 0 {
            return Err(ComputeError::Other(format!(
                "softmax: x.len()={} is not a multiple of chunk={}",
                x.len(),
                chunk
            )));
        }

        let mut result = vec![0.0f32; x.len()];
        for (row, out) in x.chunks_exact(chunk).zip(result.chunks_exact_mut(chunk)) {
            let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for (i, &v) in row.iter().enumerate() {
                let e = (v - max_val).exp();
                out[i] = e;
                sum += e;
            }
            for v in out.iter_mut() {
                *v /= sum;
            }
        }
        Ok(result)
    }

    fn rope(
        &self,
        q: &[f32],
        k: &[f32],
        head_dim: usize,
        pos: usize,
        n_heads_q: usize,
        n_heads_k: usize,
        theta: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        if q.len() != n_heads_q * head_dim {
            return Err(ComputeError::LengthMismatch {
                expected: n_heads_q * head_dim,
                got: q.len(),
            });
        }
        if k.len() != n_heads_k * head_dim {
            return Err(ComputeError::LengthMismatch {
                expected: n_heads_k * head_dim,
                got: k.len(),
            });
        }

        let rotate = |data: &[f32], n_heads: usize| -> Vec<f32> {
            let mut out = data.to_vec();
            for h in 0..n_heads {
                let offset = h * head_dim;
                for i in 0..head_dim / 2 {
                    let freq = 1.0 / theta.powf(2.0 * i as f32 / head_dim as f32);
                    let angle = pos as f32 * freq;
                    let (sin, cos) = angle.sin_cos();

                    let x0 = data[offset + 2 * i];
                    let x1 = data[offset + 2 * i + 1];
                    out[offset + 2 * i] = x0 * cos - x1 * sin;
                    out[offset + 2 * i + 1] = x0 * sin + x1 * cos;
                }
            }
            out
        };

        Ok((rotate(q, n_heads_q), rotate(k, n_heads_k)))
    }

    fn silu(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(x.iter().map(|&v| v / (1.0 + (-v).exp())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    #[test]
    fn matmul_identity() {
        let b = backend();
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let c = b.matmul(&a, &x, 2, 2, 2).unwrap();
        assert_eq!(c, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn matmul_basic() {
        let b = backend();
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let x = vec![5.0, 6.0, 7.0, 8.0];
        let c = b.matmul(&a, &x, 2, 2, 2).unwrap();
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_matvec() {
        // W [3,2] @ x [2,1] = [3,1], the shape every projection uses.
        let b = backend();
        let w = vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let x = vec![2.0, 3.0];
        let c = b.matmul(&w, &x, 3, 2, 1).unwrap();
        assert_eq!(c, vec![2.0, 3.0, 5.0]);
    }

    #[test]
    fn matmul_dedicated_pool() {
        let b = CpuBackend::with_threads(2).unwrap();
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let x = vec![5.0, 6.0, 7.0, 8.0];
        let c = b.matmul(&a, &x, 2, 2, 2).unwrap();
        assert_eq!(c, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matmul_shape_error() {
        let b = backend();
        assert!(b.matmul(&[1.0; 3], &[1.0; 4], 2, 2, 2).is_err());
    }

    #[test]
    fn add_mul() {
        let b = backend();
        assert_eq!(b.add(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), vec![4.0, 6.0]);
        assert_eq!(b.mul(&[2.0, 3.0], &[4.0, 5.0]).unwrap(), vec![8.0, 15.0]);
        assert!(b.add(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn silu_values() {
        let b = backend();
        let r = b.silu(&[0.0, 1.0]).unwrap();
        assert_relative_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 0.731_058_6, max_relative = 1e-5);
    }

    #[test]
    fn softmax_normalizes() {
        let b = backend();
        let r = b.softmax(&[1.0, 2.0, 3.0], 3).unwrap();
        let sum: f32 = r.iter().sum();
        assert_relative_eq!(sum, 1.0, max_relative = 1e-6);
        assert!(r[0] < r[1] && r[1] < r[2]);
    }

    #[test]
    fn rms_norm_unit_weight() {
        let b = backend();
        let x = vec![1.0, 2.0, 3.0, 4.0];
        let w = vec![1.0; 4];
        let r = b.rms_norm(&x, &w, 1e-5, 4).unwrap();
        let rms = (7.5f32 + 1e-5).sqrt();
        assert_relative_eq!(r[0], 1.0 / rms, max_relative = 1e-5);
        assert_relative_eq!(r[3], 4.0 / rms, max_relative = 1e-5);
    }

    #[test]
    fn rope_identity_at_origin() {
        // At pos=0 every rotation angle is zero, so q and k pass through.
        let b = backend();
        let q = vec![1.0, 0.0, 0.0, 1.0];
        let k = vec![1.0, 0.0, 0.0, 1.0];
        let (q_out, k_out) = b.rope(&q, &k, 4, 0, 1, 1, 10000.0).unwrap();
        assert_eq!(q_out, q);
        assert_eq!(k_out, k);
    }

    #[test]
    fn rope_rotates_first_pair() {
        let b = backend();
        let q = vec![1.0, 0.0];
        let k = vec![0.0, 0.0];
        let (q_out, _) = b.rope(&q, &k, 2, 1, 1, 1, 10000.0).unwrap();
        // pos=1, i=0: angle = 1.0, rotation of (1, 0) by 1 radian.
        assert!((q_out[0] - 1.0f32.cos()).abs() < 1e-6);
        assert!((q_out[1] - 1.0f32.sin()).abs() < 1e-6);
    }
}

use std::fmt::Debug;

use crate::device::DeviceKind;
use crate::error::Result;

/// Trait for pluggable compute backends (CPU, Metal, ...).
///
/// All operations take f32 slices resident in host memory and return owned
/// vectors. A backend running on another device is responsible for its own
/// staging; callers never copy across a device boundary themselves (that is
/// `LayerDispatch`'s job).
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu", "metal").
    fn name(&self) -> &str;

    /// The device this backend executes on.
    fn device(&self) -> DeviceKind;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;

    /// Element-wise addition: result[i] = a[i] + b[i].
    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Element-wise multiplication: result[i] = a[i] * b[i].
    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// RMS normalization over rows of `hidden_size` elements:
    ///   rms = sqrt(mean(x^2) + eps)
    ///   result[i] = x[i] * weight[i] / rms
    fn rms_norm(&self, x: &[f32], weight: &[f32], eps: f32, hidden_size: usize)
        -> Result<Vec<f32>>;

    /// Numerically stable softmax over chunks of `chunk` elements.
    fn softmax(&self, x: &[f32], chunk: usize) -> Result<Vec<f32>>;

    /// Rotary Position Embedding applied to query and key vectors for one
    /// token at position `pos`.
    ///
    /// - `q`: query data, shape [n_heads_q, head_dim]
    /// - `k`: key data, shape [n_heads_k, head_dim]
    ///
    /// Returns (rotated_q, rotated_k).
    #[allow(clippy::too_many_arguments)]
    fn rope(
        &self,
        q: &[f32],
        k: &[f32],
        head_dim: usize,
        pos: usize,
        n_heads_q: usize,
        n_heads_k: usize,
        theta: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)>;

    /// SiLU activation: result[i] = x[i] * sigmoid(x[i]).
    fn silu(&self, x: &[f32]) -> Result<Vec<f32>>;
}

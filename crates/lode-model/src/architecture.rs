use lode_compute::LayerDispatch;

use crate::llama::KvCache;

/// Trait for model architectures that produce next-token logits.
///
/// Implementations hold only immutable weights and hyperparameters; all
/// mutable per-sequence state lives in the caller-owned [`KvCache`]. One
/// loaded model can therefore back any number of independent contexts.
pub trait ModelArchitecture: Send + Sync {
    /// Process `tokens` starting at sequence position `pos`, writing key and
    /// value projections into `cache`, and return logits over the vocabulary
    /// for the last token.
    ///
    /// Fails with `ContextOverflow` before touching the cache if the tokens
    /// would not fit.
    fn step(
        &self,
        tokens: &[u32],
        pos: usize,
        cache: &mut KvCache,
        dispatch: &LayerDispatch,
    ) -> crate::Result<Vec<f32>>;

    /// Vocabulary size (number of output logits).
    fn vocab_size(&self) -> usize;

    /// Number of transformer layers, for placement planning.
    fn n_layers(&self) -> usize;

    /// The longest sequence the model was trained for.
    fn context_limit(&self) -> usize;

    /// Allocate an empty cache sized for a `n_ctx`-token sequence.
    fn new_cache(&self, n_ctx: usize) -> KvCache;

    /// Approximate resident bytes of one transformer layer's weights, for
    /// memory-budget placement.
    fn layer_bytes(&self) -> u64;
}

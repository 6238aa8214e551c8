use lode_compute::LayerDispatch;
use lode_model::{KvCache, ModelArchitecture};

use crate::error::{EngineError, Result};

/// Mutable per-sequence state: the KV cache and the token history.
///
/// The context owns everything a generation mutates, so the model itself
/// stays shareable. Invariant: the cache length always equals the position
/// index, and a rejected push leaves both untouched.
pub struct ExecutionContext {
    cache: KvCache,
    tokens: Vec<u32>,
    n_ctx: usize,
}

impl ExecutionContext {
    pub fn new(cache: KvCache, n_ctx: usize) -> ExecutionContext {
        ExecutionContext {
            cache,
            tokens: Vec::with_capacity(n_ctx),
            n_ctx,
        }
    }

    /// Feed a chunk of tokens through the model at the current position,
    /// extending the cache and history, and return the last token's logits.
    ///
    /// Fails with `ContextOverflow` before any state changes if the chunk
    /// does not fit.
    pub fn push(
        &mut self,
        model: &dyn ModelArchitecture,
        dispatch: &LayerDispatch,
        chunk: &[u32],
    ) -> Result<Vec<f32>> {
        let pos = self.tokens.len();
        if pos + chunk.len() > self.n_ctx {
            return Err(EngineError::ContextOverflow {
                pos: pos + chunk.len(),
                max: self.n_ctx,
            });
        }

        let logits = model
            .step(chunk, pos, &mut self.cache, dispatch)
            .map_err(|e| EngineError::Inference(e.to_string()))?;
        self.tokens.extend_from_slice(chunk);
        Ok(logits)
    }

    /// Clear the sequence without reallocating the cache arena.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.tokens.clear();
    }

    /// Current position index (tokens consumed so far).
    pub fn position(&self) -> usize {
        self.tokens.len()
    }

    /// Positions still available in the window.
    pub fn remaining(&self) -> usize {
        self.n_ctx - self.tokens.len()
    }

    /// The context window size.
    pub fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    /// Tokens consumed so far, prompt and generated alike.
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lode_compute::{ComputeBackend, CpuBackend};

    /// Stand-in model: writes the cache like a real step and returns
    /// zero logits.
    struct FlatModel;

    impl ModelArchitecture for FlatModel {
        fn step(
            &self,
            tokens: &[u32],
            pos: usize,
            cache: &mut KvCache,
            _dispatch: &LayerDispatch,
        ) -> lode_model::Result<Vec<f32>> {
            for i in 0..tokens.len() {
                cache.update(0, &[1.0], &[1.0], pos + i);
            }
            Ok(vec![0.0; 4])
        }

        fn vocab_size(&self) -> usize {
            4
        }

        fn n_layers(&self) -> usize {
            1
        }

        fn context_limit(&self) -> usize {
            8
        }

        fn new_cache(&self, n_ctx: usize) -> KvCache {
            KvCache::new(1, 1, 1, n_ctx)
        }

        fn layer_bytes(&self) -> u64 {
            0
        }
    }

    fn dispatch() -> LayerDispatch {
        let host: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());
        LayerDispatch::host_only(1, host)
    }

    #[test]
    fn push_advances_position() {
        let model = FlatModel;
        let d = dispatch();
        let mut ctx = ExecutionContext::new(model.new_cache(4), 4);

        ctx.push(&model, &d, &[1, 2]).unwrap();
        assert_eq!(ctx.position(), 2);
        assert_eq!(ctx.remaining(), 2);
        assert_eq!(ctx.tokens(), &[1, 2]);

        ctx.reset();
        assert_eq!(ctx.position(), 0);
        assert_eq!(ctx.remaining(), 4);
    }

    #[test]
    fn overflowing_push_leaves_state_untouched() {
        let model = FlatModel;
        let d = dispatch();
        let mut ctx = ExecutionContext::new(model.new_cache(4), 4);
        ctx.push(&model, &d, &[1, 2, 3]).unwrap();

        let err = ctx.push(&model, &d, &[4, 5]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::ContextOverflow { pos: 5, max: 4 }
        ));
        // The rejected push changed nothing.
        assert_eq!(ctx.position(), 3);
        assert_eq!(ctx.tokens(), &[1, 2, 3]);

        // A fitting push still works afterwards.
        ctx.push(&model, &d, &[4]).unwrap();
        assert_eq!(ctx.position(), 4);
    }
}

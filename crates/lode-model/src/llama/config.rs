use tracing::debug;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

/// LLaMA-family hyperparameters parsed from GGUF metadata.
#[derive(Debug, Clone)]
pub struct LlamaConfig {
    /// Vocabulary size (number of token embeddings).
    pub n_vocab: usize,
    /// Embedding dimension / hidden size.
    pub n_embd: usize,
    /// Number of query attention heads.
    pub n_heads: usize,
    /// Number of key/value attention heads (GQA).
    pub n_kv_heads: usize,
    /// Number of transformer layers.
    pub n_layers: usize,
    /// Feed-forward intermediate dimension.
    pub n_ff: usize,
    /// RMS normalization epsilon.
    pub norm_eps: f32,
    /// Context window the model was trained for.
    pub n_ctx_train: usize,
    /// RoPE frequency base.
    pub rope_theta: f32,
    /// Dimension of each attention head (n_embd / n_heads).
    pub head_dim: usize,
}

/// Architecture names this loader understands.
const SUPPORTED_ARCHITECTURES: &[&str] = &["llama"];

impl LlamaConfig {
    /// Parse hyperparameters from GGUF metadata.
    ///
    /// `general.architecture` selects the key prefix; anything outside the
    /// LLaMA family is rejected up front rather than failing later on a
    /// missing tensor. Keys read (for prefix `llama`):
    /// `llama.embedding_length`, `llama.attention.head_count`,
    /// `llama.attention.head_count_kv`, `llama.block_count`,
    /// `llama.feed_forward_length`, `llama.attention.layer_norm_rms_epsilon`,
    /// `llama.context_length`, `llama.rope.freq_base` (default 10000).
    /// The vocab size is the length of `tokenizer.ggml.tokens`.
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<LlamaConfig> {
        let arch = metadata.get_string("general.architecture")?;
        if !SUPPORTED_ARCHITECTURES.contains(&arch) {
            return Err(ModelError::UnsupportedArchitecture(arch.to_string()));
        }

        let n_embd = metadata.get_u32(&format!("{arch}.embedding_length"))? as usize;
        let n_heads = metadata.get_u32(&format!("{arch}.attention.head_count"))? as usize;
        let n_kv_heads = metadata.get_u32(&format!("{arch}.attention.head_count_kv"))? as usize;
        let n_layers = metadata.get_u32(&format!("{arch}.block_count"))? as usize;
        let n_ff = metadata.get_u32(&format!("{arch}.feed_forward_length"))? as usize;
        let norm_eps = metadata.get_f32(&format!("{arch}.attention.layer_norm_rms_epsilon"))?;
        let n_ctx_train = metadata.get_u32(&format!("{arch}.context_length"))? as usize;
        let rope_theta = metadata
            .get_f32(&format!("{arch}.rope.freq_base"))
            .unwrap_or(10000.0);

        let n_vocab = metadata.get_string_array("tokenizer.ggml.tokens")?.len();

        if n_heads == 0 || n_embd % n_heads != 0 {
            return Err(ModelError::Other(format!(
                "embedding length {n_embd} not divisible by head count {n_heads}"
            )));
        }
        if n_kv_heads == 0 || n_heads % n_kv_heads != 0 {
            return Err(ModelError::Other(format!(
                "head count {n_heads} not divisible by kv head count {n_kv_heads}"
            )));
        }
        let head_dim = n_embd / n_heads;

        debug!(
            arch = %arch,
            n_vocab,
            n_embd,
            n_heads,
            n_kv_heads,
            n_layers,
            n_ctx_train,
            "parsed model hyperparameters"
        );

        Ok(LlamaConfig {
            n_vocab,
            n_embd,
            n_heads,
            n_kv_heads,
            n_layers,
            n_ff,
            norm_eps,
            n_ctx_train,
            rope_theta,
            head_dim,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::metadata::GgufValue;

    fn base_metadata() -> GgufMetadata {
        let mut m = GgufMetadata::default();
        m.insert("general.architecture", GgufValue::String("llama".into()));
        m.insert("llama.embedding_length", GgufValue::U32(8));
        m.insert("llama.attention.head_count", GgufValue::U32(2));
        m.insert("llama.attention.head_count_kv", GgufValue::U32(2));
        m.insert("llama.block_count", GgufValue::U32(2));
        m.insert("llama.feed_forward_length", GgufValue::U32(16));
        m.insert(
            "llama.attention.layer_norm_rms_epsilon",
            GgufValue::F32(1e-5),
        );
        m.insert("llama.context_length", GgufValue::U32(64));
        m.insert(
            "tokenizer.ggml.tokens",
            GgufValue::Array(vec![
                GgufValue::String("a".into()),
                GgufValue::String("b".into()),
            ]),
        );
        m
    }

    #[test]
    fn parses_with_default_rope_theta() {
        let cfg = LlamaConfig::from_gguf(&base_metadata()).unwrap();
        assert_eq!(cfg.n_vocab, 2);
        assert_eq!(cfg.head_dim, 4);
        assert_eq!(cfg.rope_theta, 10000.0);
    }

    #[test]
    fn rejects_unknown_architecture() {
        let mut m = base_metadata();
        m.insert("general.architecture", GgufValue::String("gptj".into()));
        let err = LlamaConfig::from_gguf(&m).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedArchitecture(a) if a == "gptj"));
    }

    #[test]
    fn missing_key_is_reported_by_name() {
        let mut m = base_metadata();
        m.remove("llama.block_count");
        let err = LlamaConfig::from_gguf(&m).unwrap_err();
        assert!(matches!(err, ModelError::MissingKey(k) if k == "llama.block_count"));
    }
}

use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

/// Token vocabulary: the id <-> text-fragment mapping of the model.
pub struct Vocab {
    /// Token strings, indexed by token ID.
    pub tokens: Vec<String>,
    /// Merge priority scores, indexed by token ID.
    pub scores: Vec<f32>,
    /// Reverse mapping from token string to token ID.
    pub token_to_id: HashMap<String, u32>,
    /// Beginning-of-sequence token ID.
    pub bos_id: u32,
    /// End-of-sequence token ID.
    pub eos_id: u32,
}

impl Vocab {
    /// Build a vocabulary from explicit parts.
    pub fn new(tokens: Vec<String>, scores: Vec<f32>, bos_id: u32, eos_id: u32) -> Result<Vocab> {
        if tokens.len() != scores.len() {
            return Err(ModelError::Tokenizer(format!(
                "tokens length ({}) does not match scores length ({})",
                tokens.len(),
                scores.len()
            )));
        }

        let token_to_id = tokens
            .iter()
            .enumerate()
            .map(|(id, tok)| (tok.clone(), id as u32))
            .collect();

        Ok(Vocab {
            tokens,
            scores,
            token_to_id,
            bos_id,
            eos_id,
        })
    }

    /// Build a vocabulary from GGUF metadata
    /// (`tokenizer.ggml.{tokens,scores,bos_token_id,eos_token_id}`).
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<Vocab> {
        let tokens = metadata.get_string_array("tokenizer.ggml.tokens")?;
        let scores = metadata.get_f32_array("tokenizer.ggml.scores")?;
        let bos_id = metadata.get_u32("tokenizer.ggml.bos_token_id")?;
        let eos_id = metadata.get_u32("tokenizer.ggml.eos_token_id")?;
        Vocab::new(tokens, scores, bos_id, eos_id)
    }

    /// The raw bytes a token id decodes to.
    ///
    /// Byte-level tokens stored as `<0xHH>` resolve to their single byte,
    /// so a fragment may be an incomplete piece of a UTF-8 sequence.
    /// Unknown ids decode to nothing.
    pub fn token_bytes(&self, id: u32) -> Vec<u8> {
        let Some(tok) = self.tokens.get(id as usize) else {
            return Vec::new();
        };

        if tok.len() == 6 && tok.starts_with("<0x") && tok.ends_with('>') {
            if let Ok(byte) = u8::from_str_radix(&tok[3..5], 16) {
                return vec![byte];
            }
        }
        tok.as_bytes().to_vec()
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_scores() {
        let r = Vocab::new(vec!["a".into(), "b".into()], vec![0.0], 0, 1);
        assert!(matches!(r, Err(ModelError::Tokenizer(_))));
    }

    #[test]
    fn byte_token_resolves_to_byte() {
        let v = Vocab::new(
            vec!["a".into(), "<0xE2>".into()],
            vec![0.0, 0.0],
            0,
            0,
        )
        .unwrap();
        assert_eq!(v.token_bytes(0), b"a");
        assert_eq!(v.token_bytes(1), vec![0xE2]);
        assert!(v.token_bytes(99).is_empty());
    }
}

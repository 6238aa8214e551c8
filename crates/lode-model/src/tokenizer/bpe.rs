use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

use super::vocab::Vocab;

/// Byte-pair-encoding tokenizer built from GGUF metadata.
pub struct BpeTokenizer {
    /// Token vocabulary (strings, scores, special token IDs).
    pub vocab: Vocab,
    /// Merge pair to priority rank. Lower rank merges first.
    merge_ranks: HashMap<(String, String), usize>,
}

impl BpeTokenizer {
    /// Build a tokenizer from explicit parts. `merges` entries are pairs of
    /// token strings in priority order.
    pub fn new(vocab: Vocab, merges: Vec<(String, String)>) -> BpeTokenizer {
        let merge_ranks = merges
            .into_iter()
            .enumerate()
            .map(|(rank, pair)| (pair, rank))
            .collect();
        BpeTokenizer { vocab, merge_ranks }
    }

    /// Load the tokenizer from GGUF metadata.
    ///
    /// The vocabulary comes from `tokenizer.ggml.{tokens,scores,...}`; merge
    /// rules come from `tokenizer.ggml.merges`, one "left right" string per
    /// rule. Models without merge rules (plain vocab lookup) load fine.
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<BpeTokenizer> {
        let vocab = Vocab::from_gguf(metadata)?;

        let merge_strings = metadata
            .get_string_array("tokenizer.ggml.merges")
            .unwrap_or_default();

        let mut merges = Vec::with_capacity(merge_strings.len());
        for entry in &merge_strings {
            let Some((left, right)) = entry.split_once(' ') else {
                return Err(ModelError::Tokenizer(format!(
                    "invalid merge entry: {entry:?}"
                )));
            };
            merges.push((left.to_string(), right.to_string()));
        }

        Ok(BpeTokenizer::new(vocab, merges))
    }

    /// Encode text into token IDs.
    ///
    /// Each input byte becomes a unit token (the literal character if the
    /// vocabulary has it, else the `<0xHH>` byte token), then adjacent pairs
    /// are merged greedily by rank until no merge applies.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut pieces: Vec<String> = text.bytes().map(|b| self.byte_piece(b)).collect();

        while pieces.len() > 1 {
            let mut best: Option<(usize, usize)> = None;
            for i in 0..pieces.len() - 1 {
                let pair = (pieces[i].clone(), pieces[i + 1].clone());
                if let Some(&rank) = self.merge_ranks.get(&pair) {
                    if best.map_or(true, |(r, _)| rank < r) {
                        best = Some((rank, i));
                    }
                }
            }
            let Some((_, i)) = best else { break };

            let right = pieces.remove(i + 1);
            pieces[i].push_str(&right);
        }

        pieces
            .iter()
            .map(|p| self.vocab.token_to_id.get(p).copied().unwrap_or(0))
            .collect()
    }

    /// The unit piece for a single input byte.
    fn byte_piece(&self, byte: u8) -> String {
        let literal = (byte as char).to_string();
        if self.vocab.token_to_id.contains_key(&literal) {
            return literal;
        }
        let byte_token = format!("<0x{byte:02X}>");
        if self.vocab.token_to_id.contains_key(&byte_token) {
            return byte_token;
        }
        // Unknown byte, will resolve to token 0 on lookup.
        literal
    }

    /// Decode token IDs into a string, replacing invalid UTF-8 with U+FFFD.
    pub fn decode(&self, tokens: &[u32]) -> String {
        let mut bytes = Vec::new();
        for &id in tokens {
            bytes.extend_from_slice(&self.vocab.token_bytes(id));
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// The raw bytes a single token decodes to. May be an incomplete UTF-8
    /// fragment for byte-level tokens.
    pub fn token_bytes(&self, id: u32) -> Vec<u8> {
        self.vocab.token_bytes(id)
    }

    /// Beginning-of-sequence token ID.
    pub fn bos_id(&self) -> u32 {
        self.vocab.bos_id
    }

    /// End-of-sequence token ID.
    pub fn eos_id(&self) -> u32 {
        self.vocab.eos_id
    }
}

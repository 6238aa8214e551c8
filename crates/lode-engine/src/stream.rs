use std::sync::MutexGuard;
use std::time::{Duration, Instant};

use lode_compute::LayerDispatch;
use lode_model::{BpeTokenizer, ModelArchitecture};
use lode_sampler::SamplerChain;
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::request::CancelToken;

/// Why a generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `n_predict` tokens were produced.
    Length,
    /// The model sampled its end-of-sequence token.
    EndOfSequence,
    /// The context window filled up.
    ContextFull,
    /// The caller cancelled the request.
    Cancelled,
}

/// Where the generation state machine currently is.
enum Phase {
    PreFill,
    Decode,
    Stopped(StopReason),
    Failed,
}

/// Accumulates raw token bytes and releases only whole UTF-8 characters.
///
/// Byte-level tokens can split a multi-byte character across fragments;
/// the split tail is held back until completed, or flushed lossily when
/// the stream stops.
#[derive(Default)]
pub struct Utf8Buffer {
    pending: Vec<u8>,
}

impl Utf8Buffer {
    /// Append bytes and return any newly completed text.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);

        let pending = std::mem::take(&mut self.pending);
        let mut rest: &[u8] = &pending;
        let mut out = String::new();
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        // An invalid sequence never becomes valid; replace
                        // it and keep scanning.
                        Some(n) => {
                            out.push('\u{FFFD}');
                            rest = &rest[valid + n..];
                        }
                        // Incomplete tail: hold it for the next push.
                        None => {
                            rest = &rest[valid..];
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();

        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Convert whatever is still buffered, lossily, and clear.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(out)
    }
}

/// A lazy, finite stream of generated text fragments.
///
/// Holds the engine's context lock for its whole lifetime, so a second
/// generation attempt while a stream is live reports busy. The iterator
/// runs pre-fill on the first call, then one decode step per fragment;
/// dropping it mid-way simply abandons the generation.
pub struct TokenStream<'a> {
    model: &'a dyn ModelArchitecture,
    tokenizer: &'a BpeTokenizer,
    dispatch: &'a LayerDispatch,
    ctx: MutexGuard<'a, ExecutionContext>,
    chain: SamplerChain,
    prompt: Vec<u32>,
    n_batch: usize,
    n_predict: usize,
    cancel: CancelToken,
    phase: Phase,
    logits: Vec<f32>,
    produced: usize,
    buf: Utf8Buffer,
    prefill_time: Duration,
    decode_time: Duration,
}

impl<'a> TokenStream<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        model: &'a dyn ModelArchitecture,
        tokenizer: &'a BpeTokenizer,
        dispatch: &'a LayerDispatch,
        mut ctx: MutexGuard<'a, ExecutionContext>,
        chain: SamplerChain,
        prompt: Vec<u32>,
        n_batch: usize,
        n_predict: usize,
        cancel: CancelToken,
    ) -> TokenStream<'a> {
        // Every generation starts from a fresh sequence.
        ctx.reset();
        TokenStream {
            model,
            tokenizer,
            dispatch,
            ctx,
            chain,
            prompt,
            n_batch,
            n_predict,
            cancel,
            phase: Phase::PreFill,
            logits: Vec::new(),
            produced: 0,
            buf: Utf8Buffer::default(),
            prefill_time: Duration::ZERO,
            decode_time: Duration::ZERO,
        }
    }

    /// Why the stream stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match self.phase {
            Phase::Stopped(reason) => Some(reason),
            _ => None,
        }
    }

    /// Number of tokens produced so far (including a sampled EOS).
    pub fn n_tokens(&self) -> usize {
        self.produced
    }

    /// Number of prompt tokens fed during pre-fill.
    pub fn prompt_tokens(&self) -> usize {
        self.prompt.len()
    }

    /// Wall time spent in pre-fill.
    pub fn prefill_time(&self) -> Duration {
        self.prefill_time
    }

    /// Wall time spent in decode steps.
    pub fn decode_time(&self) -> Duration {
        self.decode_time
    }

    fn prefill(&mut self) -> Result<(), EngineError> {
        let started = Instant::now();
        let mut chunk_start = 0;
        while chunk_start < self.prompt.len() {
            let chunk_end = (chunk_start + self.n_batch).min(self.prompt.len());
            let chunk = self.prompt[chunk_start..chunk_end].to_vec();
            self.logits = self.ctx.push(self.model, self.dispatch, &chunk)?;
            chunk_start = chunk_end;
        }
        for &token in &self.prompt {
            self.chain.accept(token);
        }
        self.prefill_time = started.elapsed();

        let secs = self.prefill_time.as_secs_f64();
        info!(
            prompt_tokens = self.prompt.len(),
            elapsed_ms = (secs * 1e3) as u64,
            tok_per_s = if secs > 0.0 {
                self.prompt.len() as f64 / secs
            } else {
                0.0
            },
            "pre-fill complete"
        );
        Ok(())
    }

    /// Finish the stream: flush the UTF-8 holdback and record the reason.
    fn stop(
        &mut self,
        reason: StopReason,
        fragment: Option<String>,
    ) -> Option<Result<String, EngineError>> {
        let mut text = fragment.unwrap_or_default();
        if let Some(tail) = self.buf.flush() {
            text.push_str(&tail);
        }
        self.phase = Phase::Stopped(reason);
        debug!(?reason, produced = self.produced, "generation stopped");
        if text.is_empty() {
            None
        } else {
            Some(Ok(text))
        }
    }

    fn fail(&mut self, err: EngineError) -> Option<Result<String, EngineError>> {
        self.phase = Phase::Failed;
        Some(Err(err))
    }
}

impl Iterator for TokenStream<'_> {
    type Item = Result<String, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Stopped(_) | Phase::Failed => return None,
                Phase::PreFill => {
                    if self.cancel.is_cancelled() {
                        return self.stop(StopReason::Cancelled, None);
                    }
                    if let Err(e) = self.prefill() {
                        return self.fail(e);
                    }
                    self.phase = Phase::Decode;
                }
                Phase::Decode => {
                    if self.cancel.is_cancelled() {
                        return self.stop(StopReason::Cancelled, None);
                    }
                    if self.produced >= self.n_predict {
                        return self.stop(StopReason::Length, None);
                    }

                    let started = Instant::now();
                    let token = self.chain.sample(&self.logits);
                    self.chain.accept(token);
                    self.produced += 1;

                    let fragment = self.buf.push(&self.tokenizer.token_bytes(token));

                    if token == self.tokenizer.eos_id() {
                        self.decode_time += started.elapsed();
                        return self.stop(StopReason::EndOfSequence, fragment);
                    }
                    if self.ctx.remaining() == 0 {
                        self.decode_time += started.elapsed();
                        return self.stop(StopReason::ContextFull, fragment);
                    }

                    match self.ctx.push(self.model, self.dispatch, &[token]) {
                        Ok(logits) => self.logits = logits,
                        Err(EngineError::ContextOverflow { .. }) => {
                            self.decode_time += started.elapsed();
                            return self.stop(StopReason::ContextFull, fragment);
                        }
                        Err(e) => return self.fail(e),
                    }
                    self.decode_time += started.elapsed();

                    if self.produced % 50 == 0 {
                        let secs = self.decode_time.as_secs_f64();
                        debug!(
                            produced = self.produced,
                            tok_per_s = if secs > 0.0 {
                                self.produced as f64 / secs
                            } else {
                                0.0
                            },
                            "decode progress"
                        );
                    }

                    match fragment {
                        Some(text) => return Some(Ok(text)),
                        // Incomplete UTF-8 sequence, keep decoding.
                        None => continue,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use lode_compute::{ComputeBackend, CpuBackend};
    use lode_model::llama::KvCache;
    use lode_model::tokenizer::{BpeTokenizer, Vocab};
    use lode_model::ModelError;
    use lode_sampler::SamplingParams;

    /// Minimal model that emits a scripted token sequence via rigged
    /// logits; past the script it favors token 0.
    struct ScriptedModel {
        script: Vec<u32>,
        n_vocab: usize,
        n_ctx: usize,
        calls: Mutex<usize>,
    }

    impl ScriptedModel {
        fn new(script: Vec<u32>, n_vocab: usize, n_ctx: usize) -> ScriptedModel {
            ScriptedModel {
                script,
                n_vocab,
                n_ctx,
                calls: Mutex::new(0),
            }
        }
    }

    impl ModelArchitecture for ScriptedModel {
        fn step(
            &self,
            tokens: &[u32],
            pos: usize,
            cache: &mut KvCache,
            _dispatch: &LayerDispatch,
        ) -> lode_model::Result<Vec<f32>> {
            if pos + tokens.len() > cache.capacity() {
                return Err(ModelError::ContextOverflow {
                    pos: pos + tokens.len(),
                    max: cache.capacity(),
                });
            }
            for i in 0..tokens.len() {
                cache.update(0, &[0.0], &[0.0], pos + i);
            }
            let mut calls = self.calls.lock().unwrap();
            let target = self.script.get(*calls).copied().unwrap_or(0);
            *calls += 1;
            let mut logits = vec![0.0; self.n_vocab];
            logits[target as usize] = 10.0;
            Ok(logits)
        }

        fn vocab_size(&self) -> usize {
            self.n_vocab
        }

        fn n_layers(&self) -> usize {
            1
        }

        fn context_limit(&self) -> usize {
            self.n_ctx
        }

        fn new_cache(&self, n_ctx: usize) -> KvCache {
            KvCache::new(1, 1, 1, n_ctx)
        }

        fn layer_bytes(&self) -> u64 {
            0
        }
    }

    fn tokenizer() -> BpeTokenizer {
        let tokens = vec!["A".to_string(), "B".to_string(), "<eos>".to_string()];
        let scores = vec![0.0; tokens.len()];
        BpeTokenizer::new(Vocab::new(tokens, scores, 0, 2).unwrap(), Vec::new())
    }

    fn greedy_chain() -> SamplerChain {
        SamplerChain::standard(SamplingParams {
            temperature: 0.0,
            top_p: 0.9,
            repeat_penalty: 1.0,
            seed: 0,
        })
    }

    struct Fixture {
        model: ScriptedModel,
        tokenizer: BpeTokenizer,
        dispatch: LayerDispatch,
        session: Mutex<ExecutionContext>,
    }

    fn fixture(script: Vec<u32>, n_ctx: usize) -> Fixture {
        let model = ScriptedModel::new(script, 3, n_ctx);
        let host: Arc<dyn ComputeBackend> = Arc::new(CpuBackend::new());
        Fixture {
            dispatch: LayerDispatch::host_only(model.n_layers(), host),
            session: Mutex::new(ExecutionContext::new(model.new_cache(n_ctx), n_ctx)),
            model,
            tokenizer: tokenizer(),
        }
    }

    fn stream_of<'a>(
        f: &'a Fixture,
        prompt: Vec<u32>,
        n_predict: usize,
        cancel: CancelToken,
    ) -> TokenStream<'a> {
        TokenStream::new(
            &f.model,
            &f.tokenizer,
            &f.dispatch,
            f.session.try_lock().unwrap(),
            greedy_chain(),
            prompt,
            4,
            n_predict,
            cancel,
        )
    }

    #[test]
    fn eos_as_first_token_emits_its_fragment() {
        let f = fixture(vec![2], 16);
        let mut stream = stream_of(&f, vec![0], 5, CancelToken::new());

        let fragments: Vec<String> = (&mut stream).map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec!["<eos>".to_string()]);
        assert_eq!(stream.n_tokens(), 1);
        assert_eq!(stream.stop_reason(), Some(StopReason::EndOfSequence));
    }

    #[test]
    fn produces_at_most_n_predict_tokens() {
        let f = fixture(vec![0, 1, 0, 1, 0, 1, 0, 1], 32);
        let mut stream = stream_of(&f, vec![0], 3, CancelToken::new());

        let text: String = (&mut stream).map(|r| r.unwrap()).collect();
        assert_eq!(text, "ABA");
        assert_eq!(stream.n_tokens(), 3);
        assert_eq!(stream.stop_reason(), Some(StopReason::Length));
    }

    #[test]
    fn zero_n_predict_yields_nothing() {
        let f = fixture(vec![0], 16);
        let mut stream = stream_of(&f, vec![0], 0, CancelToken::new());
        assert!(stream.next().is_none());
        assert_eq!(stream.stop_reason(), Some(StopReason::Length));
    }

    #[test]
    fn cancellation_stops_with_partial_output() {
        let f = fixture(vec![0, 1, 0, 1, 0, 1], 32);
        let cancel = CancelToken::new();
        let mut stream = stream_of(&f, vec![0], 100, cancel.clone());

        let mut text = String::new();
        text.push_str(&stream.next().unwrap().unwrap());
        text.push_str(&stream.next().unwrap().unwrap());
        cancel.cancel();
        for frag in &mut stream {
            text.push_str(&frag.unwrap());
        }

        assert_eq!(text, "AB");
        assert_eq!(stream.stop_reason(), Some(StopReason::Cancelled));
    }

    #[test]
    fn full_context_stops_rather_than_errors() {
        // Window of 3: one prompt token leaves room for two steps. The
        // third sampled token is still emitted; the stop comes when it
        // cannot be appended.
        let f = fixture(vec![0, 1, 0, 1], 3);
        let mut stream = stream_of(&f, vec![0], 100, CancelToken::new());

        let text: String = (&mut stream).map(|r| r.unwrap()).collect();
        assert_eq!(text, "ABA");
        assert_eq!(stream.stop_reason(), Some(StopReason::ContextFull));
    }

    #[test]
    fn utf8_buffer_holds_split_sequences() {
        let mut buf = Utf8Buffer::default();
        let bytes = "é".as_bytes(); // two bytes
        assert_eq!(buf.push(&bytes[..1]), None);
        assert_eq!(buf.push(&bytes[1..]).as_deref(), Some("é"));
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn utf8_buffer_replaces_invalid_bytes() {
        let mut buf = Utf8Buffer::default();
        assert_eq!(buf.push(&[b'a', 0xFF, b'b']).as_deref(), Some("a\u{FFFD}b"));
    }

    #[test]
    fn utf8_buffer_flushes_incomplete_tail_lossily() {
        let mut buf = Utf8Buffer::default();
        assert_eq!(buf.push(&[0xE2, 0x82]), None);
        assert_eq!(buf.flush().as_deref(), Some("\u{FFFD}"));
    }
}

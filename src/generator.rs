//! # Request Descriptor Generator
//!
//! Synthesizes prompts and target input/output token lengths from a
//! range-ratio sampling scheme: per-request lengths are drawn uniformly from
//! `[len * range_ratio, len]`, every prompt shares an optional random token
//! prefix, and the body tokens walk the vocabulary from a random per-request
//! offset so no two prompts collide in a server-side prefix cache beyond the
//! shared prefix.
//!
//! The tokenizer is a capability supplied by the caller; benchmarks that
//! need no real vocabulary use the deterministic [`SyntheticTokenizer`].

use crate::error::BenchmarkError;
use crate::executor::RequestDescriptor;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Minimal tokenizer capability: enough to synthesize prompts and to
/// estimate output lengths from generated text.
pub trait Tokenizer: Send + Sync {
    fn vocab_size(&self) -> u32;
    /// Token ids for a text. Only the id count matters to the aggregator.
    fn encode(&self, text: &str) -> Vec<u32>;
    /// Text for a sequence of token ids. One id maps to one whitespace-separated word.
    fn decode(&self, ids: &[u32]) -> String;
}

/// Deterministic stand-in tokenizer with a fixed-size vocabulary.
///
/// `decode` renders each id as a distinct word; `encode` splits on
/// whitespace, so `encode(decode(ids)).len() == ids.len()` holds, which is
/// the property both the generator and the output-length estimator rely on.
#[derive(Debug, Clone)]
pub struct SyntheticTokenizer {
    vocab_size: u32,
}

impl SyntheticTokenizer {
    pub fn new(vocab_size: u32) -> Self {
        Self {
            vocab_size: vocab_size.max(1),
        }
    }
}

impl Default for SyntheticTokenizer {
    fn default() -> Self {
        Self::new(crate::defaults::VOCAB_SIZE)
    }
}

impl Tokenizer for SyntheticTokenizer {
    fn vocab_size(&self) -> u32 {
        self.vocab_size
    }

    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .map(|word| {
                word.strip_prefix("tok")
                    .and_then(|id| id.parse::<u32>().ok())
                    .unwrap_or_else(|| {
                        let mut hasher = DefaultHasher::new();
                        word.hash(&mut hasher);
                        (hasher.finish() % u64::from(self.vocab_size)) as u32
                    })
            })
            .collect()
    }

    fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .map(|id| format!("tok{}", id % self.vocab_size))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Generate `num_prompts` random request descriptors.
///
/// Per-request input and output lengths are sampled uniformly from
/// `[len * range_ratio, len]` (range_ratio 1.0 pins them to `len` exactly).
/// All prompts share one random prefix of `prefix_len` tokens.
pub fn sample_random_requests(
    prefix_len: usize,
    input_len: usize,
    output_len: usize,
    num_prompts: usize,
    range_ratio: f64,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<RequestDescriptor>, BenchmarkError> {
    if num_prompts == 0 {
        return Err(BenchmarkError::Configuration(
            "prompt count must be at least 1".to_string(),
        ));
    }
    if input_len == 0 || output_len == 0 {
        return Err(BenchmarkError::Configuration(
            "input and output lengths must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&range_ratio) {
        return Err(BenchmarkError::Configuration(format!(
            "range ratio must be within [0, 1], got {}",
            range_ratio
        )));
    }

    let mut rng = rand::thread_rng();
    let vocab = u64::from(tokenizer.vocab_size().max(1));

    let prefix_ids: Vec<u32> = (0..prefix_len)
        .map(|_| rng.gen_range(0..vocab as u32))
        .collect();

    let input_low = (input_len as f64 * range_ratio) as usize;
    let output_low = ((output_len as f64 * range_ratio) as usize).max(1);

    let mut descriptors = Vec::with_capacity(num_prompts);
    for i in 0..num_prompts {
        let request_input_len = rng.gen_range(input_low.max(1)..=input_len);
        let request_output_len = rng.gen_range(output_low..=output_len);
        let offset = rng.gen_range(0..vocab);

        let mut ids = prefix_ids.clone();
        ids.extend(
            (0..request_input_len as u64).map(|j| ((offset + i as u64 + j) % vocab) as u32),
        );

        descriptors.push(RequestDescriptor {
            prompt: tokenizer.decode(&ids),
            prefix_len,
            prompt_len: prefix_len + request_input_len,
            output_len: request_output_len,
            multimodal: None,
            model_override: None,
        });
    }

    Ok(descriptors)
}

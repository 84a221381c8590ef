//! Skip-gram embedding with negative sampling
//!
//! Each token predicts the tokens around it within a randomly shrunk window.
//! Noise tokens are drawn from the unigram distribution raised to 0.75, and
//! frequent tokens can be subsampled. All randomness comes from one seeded RNG,
//! so a fixed seed and corpus reproduce the same vectors.

use super::{SequenceEmbedder, TokenVectors};
use crate::error::MapperError;
use rand::rngs::StdRng;
use rand::distributions::WeightedIndex;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Exponent applied to unigram counts for the noise distribution
const NOISE_POWER: f64 = 0.75;

/// Skip-gram hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipGramParams {
    /// Vector dimensionality
    pub feature_size: usize,
    /// Maximum distance between a token and its context
    pub window: usize,
    /// Tokens seen fewer times than this are ignored
    pub min_count: usize,
    /// Passes over the corpus
    pub epochs: usize,
    /// Noise tokens drawn per positive pair
    pub negative: usize,
    /// Subsampling threshold for frequent tokens (0 disables)
    pub sample: f64,
    /// Initial learning rate
    pub alpha: f64,
    /// Final learning rate
    pub min_alpha: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for SkipGramParams {
    fn default() -> Self {
        Self {
            feature_size: 100,
            window: 4,
            min_count: 0,
            epochs: 5,
            negative: 5,
            sample: 1e-3,
            alpha: 0.025,
            min_alpha: 0.0001,
            seed: 1,
        }
    }
}

impl SkipGramParams {
    pub fn validate(&self) -> Result<(), MapperError> {
        if self.feature_size == 0 {
            return Err(MapperError::Configuration(
                "feature_size must be a positive integer".to_string(),
            ));
        }
        if self.window == 0 {
            return Err(MapperError::Configuration(
                "window must be a positive integer".to_string(),
            ));
        }
        if self.epochs == 0 {
            return Err(MapperError::Configuration(
                "epochs must be a positive integer".to_string(),
            ));
        }
        if !(self.alpha > 0.0) || !(self.min_alpha >= 0.0) || self.min_alpha > self.alpha {
            return Err(MapperError::Configuration(format!(
                "learning rates must satisfy 0 <= min_alpha <= alpha and alpha > 0, got alpha={} min_alpha={}",
                self.alpha, self.min_alpha
            )));
        }
        if !(self.sample >= 0.0) {
            return Err(MapperError::Configuration(format!(
                "sample must be >= 0, got {}",
                self.sample
            )));
        }
        Ok(())
    }
}

/// Skip-gram trainer
#[derive(Debug, Clone, Default)]
pub struct SkipGram {
    params: SkipGramParams,
}

impl SkipGram {
    pub fn new(params: SkipGramParams) -> Result<Self, MapperError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SkipGramParams {
        &self.params
    }
}

impl SequenceEmbedder for SkipGram {
    fn embed(&self, corpus: &[Vec<String>]) -> Result<TokenVectors, MapperError> {
        self.params.validate()?;
        let vocab = Vocabulary::build(corpus, self.params.min_count);
        if vocab.is_empty() {
            return Err(MapperError::EmptyResult(format!(
                "no token occurs at least {} times",
                self.params.min_count
            )));
        }

        let mut model = Model::new(&vocab, &self.params)?;
        model.train(corpus, &vocab)?;
        Ok(model.into_vectors(&vocab))
    }
}

/// Retained tokens with their counts, most frequent first
struct Vocabulary {
    tokens: Vec<String>,
    counts: Vec<u64>,
    index: HashMap<String, usize>,
}

impl Vocabulary {
    fn build(corpus: &[Vec<String>], min_count: usize) -> Self {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for sentence in corpus {
            for token in sentence {
                *counts.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        let mut entries: Vec<(&str, u64)> = counts
            .into_iter()
            .filter(|(_, c)| *c >= min_count as u64)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let tokens: Vec<String> = entries.iter().map(|(t, _)| t.to_string()).collect();
        let counts = entries.iter().map(|(_, c)| *c).collect();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        Self {
            tokens,
            counts,
            index,
        }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

struct Model<'p> {
    params: &'p SkipGramParams,
    dim: usize,
    syn0: Vec<f64>,
    syn1neg: Vec<f64>,
    /// Unigram counts raised to `NOISE_POWER`
    noise: WeightedIndex<f64>,
    /// Probability of keeping each token under subsampling
    keep_prob: Vec<f64>,
    rng: StdRng,
}

impl<'p> Model<'p> {
    fn new(vocab: &Vocabulary, params: &'p SkipGramParams) -> Result<Self, MapperError> {
        let dim = params.feature_size;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let syn0 = (0..vocab.len() * dim)
            .map(|_| (rng.gen::<f64>() - 0.5) / dim as f64)
            .collect();
        let syn1neg = vec![0.0; vocab.len() * dim];

        let noise = WeightedIndex::new(vocab.counts.iter().map(|&c| (c as f64).powf(NOISE_POWER)))
            .map_err(|e| MapperError::Algorithm(format!("noise distribution: {}", e)))?;

        let total = vocab.total() as f64;
        let keep_prob = vocab
            .counts
            .iter()
            .map(|&c| {
                if params.sample <= 0.0 {
                    return 1.0;
                }
                let threshold = params.sample * total;
                let c = c as f64;
                (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0)
            })
            .collect();

        Ok(Self {
            params,
            dim,
            syn0,
            syn1neg,
            noise,
            keep_prob,
            rng,
        })
    }

    fn train(&mut self, corpus: &[Vec<String>], vocab: &Vocabulary) -> Result<(), MapperError> {
        let total_steps = (vocab.total() * self.params.epochs as u64).max(1) as f64;
        let mut processed: u64 = 0;
        let mut neu1e = vec![0.0; self.dim];

        for _ in 0..self.params.epochs {
            for sentence in corpus {
                let mut ids: Vec<usize> = Vec::with_capacity(sentence.len());
                for token in sentence {
                    if let Some(&i) = vocab.index.get(token) {
                        processed += 1;
                        if self.keep_prob[i] >= 1.0 || self.rng.gen::<f64>() < self.keep_prob[i] {
                            ids.push(i);
                        }
                    }
                }

                let progress = processed as f64 / total_steps;
                let alpha = (self.params.alpha - (self.params.alpha - self.params.min_alpha) * progress)
                    .max(self.params.min_alpha);

                for pos in 0..ids.len() {
                    let shrink = self.rng.gen_range(0..self.params.window);
                    let reach = self.params.window - shrink;
                    let start = pos.saturating_sub(reach);
                    let end = (pos + reach).min(ids.len() - 1);
                    for ctx in start..=end {
                        if ctx == pos {
                            continue;
                        }
                        self.train_pair(ids[ctx], ids[pos], alpha, &mut neu1e);
                    }
                }
            }
        }

        if self.syn0.iter().any(|v| !v.is_finite()) {
            return Err(MapperError::Algorithm(
                "skip-gram training diverged (non-finite weights)".to_string(),
            ));
        }
        Ok(())
    }

    /// One positive pair plus negative samples; updates the input row last
    fn train_pair(&mut self, input: usize, target: usize, alpha: f64, neu1e: &mut [f64]) {
        let dim = self.dim;
        let in_off = input * dim;
        neu1e.iter_mut().for_each(|v| *v = 0.0);

        for d in 0..=self.params.negative {
            let (out, label) = if d == 0 {
                (target, 1.0)
            } else {
                let noise = self.sample_noise();
                if noise == target {
                    continue;
                }
                (noise, 0.0)
            };

            let out_off = out * dim;
            let f: f64 = (0..dim)
                .map(|k| self.syn0[in_off + k] * self.syn1neg[out_off + k])
                .sum();
            let g = (label - sigmoid(f)) * alpha;

            for k in 0..dim {
                neu1e[k] += g * self.syn1neg[out_off + k];
                self.syn1neg[out_off + k] += g * self.syn0[in_off + k];
            }
        }

        for k in 0..dim {
            self.syn0[in_off + k] += neu1e[k];
        }
    }

    fn sample_noise(&mut self) -> usize {
        self.rng.sample(&self.noise)
    }

    fn into_vectors(self, vocab: &Vocabulary) -> TokenVectors {
        vocab
            .tokens
            .iter()
            .enumerate()
            .map(|(i, token)| {
                let row = self.syn0[i * self.dim..(i + 1) * self.dim].to_vec();
                (token.clone(), row)
            })
            .collect()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

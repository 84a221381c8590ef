//! Activity embedding
//!
//! Learns a vector per activity from the sequence corpus and joins the learned
//! vectors back onto activity labels.
//!
//! Pipeline: SequenceCorpus → tokenize → SequenceEmbedder → remap_to_labels → EmbeddingTable

pub mod skipgram;

pub use skipgram::{SkipGram, SkipGramParams};

use crate::error::MapperError;
use crate::types::{ActivityEmbedding, ActivityMap, EmbeddingTable, SequenceCorpus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Token to vector mapping produced by an embedder
pub type TokenVectors = BTreeMap<String, Vec<f64>>;

/// Distributional embedding model over tokenized sequences
pub trait SequenceEmbedder {
    /// Fit on the corpus and return one vector per retained token
    fn embed(&self, corpus: &[Vec<String>]) -> Result<TokenVectors, MapperError>;
}

/// How to treat dictionary activities that received no vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentPolicy {
    /// Every dictionary activity must have a vector
    #[default]
    Strict,
    /// Drop dictionary activities without a vector and log them
    Intersect,
}

/// Split every sequence string on whitespace
pub fn tokenize<'a, I>(sequences: I) -> Vec<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    sequences
        .into_iter()
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .collect()
}

/// Tokenize the corpus and fit the embedder on it
pub fn train<E: SequenceEmbedder + ?Sized>(
    corpus: &SequenceCorpus,
    embedder: &E,
) -> Result<TokenVectors, MapperError> {
    if corpus.is_empty() {
        return Err(MapperError::EmptyResult(
            "empty corpus: no sequences met the minimum length".to_string(),
        ));
    }

    let tokenized = tokenize(corpus.sequence_strings());
    let vectors = embedder.embed(&tokenized)?;

    debug!(
        sequences = tokenized.len(),
        vocabulary = vectors.len(),
        "trained activity embeddings"
    );
    Ok(vectors)
}

/// Join token vectors onto activity labels by activity ID
///
/// Tokens must parse as activity IDs present in `activity_map`. Dictionary
/// activities that have no vector are handled according to `policy`.
pub fn remap_to_labels(
    activity_map: &ActivityMap,
    vectors: &TokenVectors,
    policy: AlignmentPolicy,
) -> Result<EmbeddingTable, MapperError> {
    remap(activity_map, vectors, policy, None)
}

/// `corpus_ids` names the IDs that occur in some sequence, so a Strict
/// failure can say why an activity went unembedded
fn remap(
    activity_map: &ActivityMap,
    vectors: &TokenVectors,
    policy: AlignmentPolicy,
    corpus_ids: Option<&HashSet<u32>>,
) -> Result<EmbeddingTable, MapperError> {
    let mut by_id: BTreeMap<u32, &Vec<f64>> = BTreeMap::new();
    for (token, vector) in vectors {
        let id: u32 = token.parse().map_err(|_| {
            MapperError::DataIntegrity(format!("Embedding token '{}' is not an activity ID", token))
        })?;
        if activity_map.get(id).is_none() {
            return Err(MapperError::DataIntegrity(format!(
                "Embedding token {} has no entry in activity_map",
                id
            )));
        }
        by_id.insert(id, vector);
    }

    let mut entries = Vec::with_capacity(by_id.len());
    let mut missing = Vec::new();
    for (id, label) in activity_map.iter() {
        match by_id.get(&id) {
            Some(vector) => entries.push(ActivityEmbedding {
                activity_id: id,
                activity: label.to_string(),
                vector: (*vector).clone(),
            }),
            None => missing.push((id, label)),
        }
    }

    if !missing.is_empty() {
        let labels: Vec<&str> = missing.iter().map(|(_, label)| *label).collect();
        match policy {
            AlignmentPolicy::Strict => {
                return Err(MapperError::DataIntegrity(missing_message(
                    &missing, corpus_ids,
                )));
            }
            AlignmentPolicy::Intersect => {
                warn!(
                    dropped = missing.len(),
                    activities = %labels.join(", "),
                    "dropping activities without embeddings"
                );
            }
        }
    }

    if entries.is_empty() {
        return Err(MapperError::EmptyResult(
            "no activity received an embedding".to_string(),
        ));
    }

    Ok(EmbeddingTable { entries })
}

fn missing_message(missing: &[(u32, &str)], corpus_ids: Option<&HashSet<u32>>) -> String {
    let Some(corpus_ids) = corpus_ids else {
        let labels: Vec<&str> = missing.iter().map(|(_, label)| *label).collect();
        return format!(
            "{} activities have no embedding: {}",
            labels.len(),
            labels.join(", ")
        );
    };

    let (rare, absent): (Vec<_>, Vec<_>) =
        missing.iter().partition(|(id, _)| corpus_ids.contains(id));
    let mut parts = Vec::new();
    if !absent.is_empty() {
        let labels: Vec<&str> = absent.iter().map(|(_, label)| *label).collect();
        parts.push(format!(
            "{} activities appear in no sequence (all their sessions are shorter than min_length): {}",
            labels.len(),
            labels.join(", ")
        ));
    }
    if !rare.is_empty() {
        let labels: Vec<&str> = rare.iter().map(|(_, label)| *label).collect();
        parts.push(format!(
            "{} activities occur fewer than min_activity_count times: {}",
            labels.len(),
            labels.join(", ")
        ));
    }
    parts.join("; ")
}

/// Train on the corpus and return label-keyed embeddings
pub fn fit_embeddings<E: SequenceEmbedder + ?Sized>(
    corpus: &SequenceCorpus,
    embedder: &E,
    policy: AlignmentPolicy,
) -> Result<EmbeddingTable, MapperError> {
    let vectors = train(corpus, embedder)?;
    let corpus_ids: HashSet<u32> = corpus
        .sequences
        .iter()
        .flat_map(|s| s.tokens.iter())
        .filter_map(|t| t.parse().ok())
        .collect();
    remap(&corpus.activity_map, &vectors, policy, Some(&corpus_ids))
}

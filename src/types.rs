//! Core types for the Behavior Mapper pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: activity records, dictionaries, session sequences, embeddings, and
//! the terminal cluster table.

use crate::error::MapperError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Noise label assigned by the density clusterers
pub const NOISE: i32 = -1;

/// A single activity occurrence within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Session identifier (merge key for sequences)
    #[serde(alias = "ID", alias = "id")]
    pub session_id: String,
    /// Activity label (transaction or user behavior)
    pub activity: String,
    /// When the activity occurred
    #[serde(alias = "timestamp")]
    pub occurrence: DateTime<Utc>,
    /// Dense activity ID, populated by `ActivityTable::map_activity_ids`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<u32>,
}

impl ActivityRecord {
    pub fn new(
        session_id: impl Into<String>,
        activity: impl Into<String>,
        occurrence: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            activity: activity.into(),
            occurrence,
            activity_id: None,
        }
    }
}

/// Activity dictionary: dense ID (first-seen order) to activity label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityMap(BTreeMap<u32, String>);

impl ActivityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from labels in first-seen order, skipping repeats
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = Self::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for label in labels {
            if seen.insert(label) {
                let id = map.0.len() as u32;
                map.0.insert(id, label.to_string());
            }
        }
        map
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.0.iter().map(|(id, label)| (*id, label.as_str()))
    }

    /// Label to ID lookup
    pub fn inverse(&self) -> HashMap<&str, u32> {
        self.0
            .iter()
            .map(|(id, label)| (label.as_str(), *id))
            .collect()
    }
}

impl FromIterator<(u32, String)> for ActivityMap {
    fn from_iter<T: IntoIterator<Item = (u32, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Activity label to number of distinct sessions containing it
pub type ActivityCounts = BTreeMap<String, u64>;

/// Ordered activity tokens for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSequence {
    /// Session identifier
    pub session_id: String,
    /// Activity ID tokens in ascending occurrence order
    pub tokens: Vec<String>,
    /// Number of steps after optional repeat collapsing
    pub step_count: usize,
    /// Whitespace-joined token serialization
    pub sequence: String,
}

impl SessionSequence {
    pub fn new(session_id: impl Into<String>, tokens: Vec<String>) -> Self {
        let sequence = tokens.join(" ");
        Self {
            session_id: session_id.into(),
            step_count: tokens.len(),
            tokens,
            sequence,
        }
    }
}

/// Sequences plus the dictionaries computed upstream of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceCorpus {
    /// Retained sequences in ascending session order
    pub sequences: Vec<SessionSequence>,
    /// Dictionary used to tokenize the sequences
    pub activity_map: ActivityMap,
    /// Distinct session counts per activity
    pub activity_counts: ActivityCounts,
}

impl SequenceCorpus {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Whitespace-joined sequence strings, one per session
    pub fn sequence_strings(&self) -> impl Iterator<Item = &str> {
        self.sequences.iter().map(|s| s.sequence.as_str())
    }
}

/// Learned vector for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEmbedding {
    pub activity_id: u32,
    pub activity: String,
    pub vector: Vec<f64>,
}

/// Activity embeddings in ascending activity ID order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTable {
    pub entries: Vec<ActivityEmbedding>,
}

impl EmbeddingTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, activity: &str) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|e| e.activity == activity)
            .map(|e| e.vector.as_slice())
    }
}

/// One activity in the behavioral map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRow {
    /// Activity label
    pub activity: String,
    /// Embedding components
    pub features: Vec<f64>,
    /// First projected dimension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Second projected dimension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Percentile rank (0-100) of distinct-session volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_pctl: Option<f64>,
    /// Cluster label, `NOISE` for unclustered activities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<i32>,
}

/// Table of activities with their features, projection, volume and cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterTable {
    pub rows: Vec<ClusterRow>,
}

impl ClusterTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dimensionality of the embedding columns (0 for an empty table)
    pub fn feature_size(&self) -> usize {
        self.rows.first().map(|r| r.features.len()).unwrap_or(0)
    }

    pub fn row(&self, activity: &str) -> Option<&ClusterRow> {
        self.rows.iter().find(|r| r.activity == activity)
    }

    /// Extract one numeric column
    pub fn column(&self, dim: &ClusterDimension) -> Result<Vec<f64>, MapperError> {
        self.rows
            .iter()
            .map(|row| {
                let value = match dim {
                    ClusterDimension::Feature(i) => row.features.get(*i).copied(),
                    ClusterDimension::X => row.x,
                    ClusterDimension::Y => row.y,
                    ClusterDimension::VolumePctl => row.volume_pctl,
                };
                value.ok_or_else(|| {
                    MapperError::DataIntegrity(format!(
                        "Column '{}' is not available for activity '{}'",
                        dim, row.activity
                    ))
                })
            })
            .collect()
    }

    /// Build the row-major matrix of the given columns
    pub fn matrix(&self, dims: &[ClusterDimension]) -> Result<Vec<Vec<f64>>, MapperError> {
        let columns = dims
            .iter()
            .map(|d| self.column(d))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.rows.len())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect())
    }

    /// Cluster labels, if clustering has run
    pub fn labels(&self) -> Option<Vec<i32>> {
        self.rows.iter().map(|r| r.cluster).collect()
    }
}

impl From<EmbeddingTable> for ClusterTable {
    fn from(table: EmbeddingTable) -> Self {
        Self {
            rows: table
                .entries
                .into_iter()
                .map(|e| ClusterRow {
                    activity: e.activity,
                    features: e.vector,
                    x: None,
                    y: None,
                    volume_pctl: None,
                    cluster: None,
                })
                .collect(),
        }
    }
}

/// A numeric column of the cluster table usable for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClusterDimension {
    /// Embedding component by index
    Feature(usize),
    X,
    Y,
    VolumePctl,
}

impl FromStr for ClusterDimension {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x" => Ok(ClusterDimension::X),
            "y" => Ok(ClusterDimension::Y),
            "volume_pctl" => Ok(ClusterDimension::VolumePctl),
            other => other.parse::<usize>().map(ClusterDimension::Feature).map_err(|_| {
                MapperError::Configuration(format!(
                    "Unknown cluster dimension '{}' (expected x, y, volume_pctl or a feature index)",
                    other
                ))
            }),
        }
    }
}

impl TryFrom<String> for ClusterDimension {
    type Error = MapperError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClusterDimension> for String {
    fn from(dim: ClusterDimension) -> Self {
        dim.to_string()
    }
}

impl fmt::Display for ClusterDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterDimension::Feature(i) => write!(f, "{}", i),
            ClusterDimension::X => f.write_str("x"),
            ClusterDimension::Y => f.write_str("y"),
            ClusterDimension::VolumePctl => f.write_str("volume_pctl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_activity_map_first_seen_order() {
        let map = ActivityMap::from_labels(["login", "browse", "login", "purchase", "browse"]);
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![(0, "login"), (1, "browse"), (2, "purchase")]);
        assert_eq!(map.inverse()["purchase"], 2);
    }

    #[test]
    fn test_session_sequence_serialization() {
        let seq = SessionSequence::new("A", vec!["0".into(), "1".into(), "2".into()]);
        assert_eq!(seq.sequence, "0 1 2");
        assert_eq!(seq.step_count, 3);
    }

    #[test]
    fn test_cluster_dimension_parsing() {
        assert_eq!("x".parse::<ClusterDimension>().unwrap(), ClusterDimension::X);
        assert_eq!(
            "volume_pctl".parse::<ClusterDimension>().unwrap(),
            ClusterDimension::VolumePctl
        );
        assert_eq!(
            "3".parse::<ClusterDimension>().unwrap(),
            ClusterDimension::Feature(3)
        );
        assert!("sess_count".parse::<ClusterDimension>().is_err());
    }

    #[test]
    fn test_missing_column_is_integrity_error() {
        let table = ClusterTable {
            rows: vec![ClusterRow {
                activity: "login".to_string(),
                features: vec![0.1, 0.2],
                x: Some(1.0),
                y: Some(2.0),
                volume_pctl: None,
                cluster: None,
            }],
        };

        let matrix = table
            .matrix(&[ClusterDimension::X, ClusterDimension::Feature(1)])
            .unwrap();
        assert_eq!(matrix, vec![vec![1.0, 0.2]]);

        let err = table.column(&ClusterDimension::VolumePctl).unwrap_err();
        assert!(matches!(err, MapperError::DataIntegrity(_)));
    }
}

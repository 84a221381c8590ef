//! Configuration Management
//!
//! Every tunable of the pipeline lives in [`MapperConfig`], loaded from TOML.
//! Missing sections and keys fall back to their defaults.

use crate::cluster::{DensityClusterer, DistanceMetric, Dbscan, Optics};
use crate::embedding::{AlignmentPolicy, SkipGram, SkipGramParams};
use crate::error::MapperError;
use crate::projection::{Tsne, TsneParams};
use crate::types::ClusterDimension;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// DBSCAN radius used when `clustering.eps` is not set
pub const DEFAULT_EPS: f64 = 5.0;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Sequence corpus construction
    #[serde(default)]
    pub corpus: CorpusConfig,
    /// Skip-gram training and label alignment
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// 2D projection
    #[serde(default)]
    pub projection: TsneParams,
    /// Density clustering
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// Corpus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Sessions with fewer steps are dropped
    pub min_length: usize,
    /// Collapse adjacent repeats of the same activity
    pub collapse_repeats: bool,
    /// Substring patterns; matching activities are removed before mapping
    pub drop_activities: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            min_length: 2,
            collapse_repeats: true,
            drop_activities: Vec::new(),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub feature_size: usize,
    pub window: usize,
    /// Activities occurring fewer times get no vector
    pub min_activity_count: usize,
    pub epochs: usize,
    pub negative: usize,
    pub sample: f64,
    pub alpha: f64,
    pub min_alpha: f64,
    pub seed: u64,
    /// What to do with dictionary activities the model has no vector for
    pub alignment: AlignmentPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let params = SkipGramParams::default();
        Self {
            feature_size: params.feature_size,
            window: params.window,
            min_activity_count: params.min_count,
            epochs: params.epochs,
            negative: params.negative,
            sample: params.sample,
            alpha: params.alpha,
            min_alpha: params.min_alpha,
            seed: params.seed,
            alignment: AlignmentPolicy::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn skip_gram_params(&self) -> SkipGramParams {
        SkipGramParams {
            feature_size: self.feature_size,
            window: self.window,
            min_count: self.min_activity_count,
            epochs: self.epochs,
            negative: self.negative,
            sample: self.sample,
            alpha: self.alpha,
            min_alpha: self.min_alpha,
            seed: self.seed,
        }
    }

    pub fn skip_gram(&self) -> Result<SkipGram, MapperError> {
        SkipGram::new(self.skip_gram_params())
    }
}

/// Density algorithm selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    #[default]
    Dbscan,
    Optics,
}

/// Clustering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub algorithm: ClusterAlgorithm,
    /// Columns to cluster on: `x`, `y`, `volume_pctl` or a feature index
    pub dims: Vec<ClusterDimension>,
    /// Neighborhood size for a core point, the point itself included
    pub min_samples: usize,
    /// DBSCAN radius (5.0 when unset); OPTICS extraction radius (`max_eps` when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eps: Option<f64>,
    /// OPTICS neighborhood bound; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_eps: Option<f64>,
    pub metric: DistanceMetric,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            algorithm: ClusterAlgorithm::Dbscan,
            dims: vec![
                ClusterDimension::X,
                ClusterDimension::Y,
                ClusterDimension::VolumePctl,
            ],
            min_samples: 3,
            eps: None,
            max_eps: None,
            metric: DistanceMetric::Euclidean,
        }
    }
}

impl ClusteringConfig {
    /// Build the configured clusterer
    pub fn clusterer(&self) -> Result<Box<dyn DensityClusterer>, MapperError> {
        match self.algorithm {
            ClusterAlgorithm::Dbscan => {
                let dbscan = Dbscan::new(self.eps.unwrap_or(DEFAULT_EPS), self.min_samples)?
                    .with_metric(self.metric);
                Ok(Box::new(dbscan))
            }
            ClusterAlgorithm::Optics => {
                let mut optics = Optics::new(self.min_samples)?.with_metric(self.metric);
                if let Some(max_eps) = self.max_eps {
                    optics = optics.with_max_eps(max_eps)?;
                }
                if let Some(eps) = self.eps {
                    optics = optics.with_eps(eps)?;
                }
                Ok(Box::new(optics))
            }
        }
    }
}

impl MapperConfig {
    /// Validate config values are within acceptable ranges.
    /// Returns Ok(()) if valid, or the first invalid field as a configuration error.
    pub fn validate(&self) -> Result<(), MapperError> {
        if self.corpus.min_length == 0 {
            return Err(MapperError::Configuration(
                "corpus.min_length must be a positive integer".to_string(),
            ));
        }
        if self.corpus.drop_activities.iter().any(|p| p.is_empty()) {
            return Err(MapperError::Configuration(
                "corpus.drop_activities must not contain empty patterns".to_string(),
            ));
        }
        self.embedding.skip_gram_params().validate()?;
        self.projection.validate()?;
        if self.clustering.dims.is_empty() {
            return Err(MapperError::Configuration(
                "clustering.dims must name at least one column".to_string(),
            ));
        }
        // builds and discards the clusterer to run its parameter checks
        self.clustering.clusterer()?;
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, MapperError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapperError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Generate TOML representation
    pub fn to_toml(&self) -> Result<String, MapperError> {
        toml::to_string_pretty(self).map_err(|e| MapperError::Configuration(e.to_string()))
    }

    pub fn tsne(&self) -> Result<Tsne, MapperError> {
        Tsne::new(self.projection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.corpus.min_length, 2);
        assert!(config.corpus.collapse_repeats);
        assert_eq!(config.embedding.feature_size, 100);
        assert_eq!(config.embedding.window, 4);
        assert_eq!(config.embedding.alignment, AlignmentPolicy::Strict);
        assert_eq!(config.projection.perplexity, 2.0);
        assert_eq!(config.clustering.algorithm, ClusterAlgorithm::Dbscan);
        assert_eq!(config.clustering.min_samples, 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = MapperConfig::from_toml_str(
            r#"
[corpus]
min_length = 3
drop_activities = ["logout"]

[clustering]
algorithm = "optics"
dims = ["x", "y", "0"]
max_eps = 2.5
metric = "manhattan"
"#,
        )
        .unwrap();

        assert_eq!(config.corpus.min_length, 3);
        assert!(config.corpus.collapse_repeats);
        assert_eq!(config.corpus.drop_activities, vec!["logout".to_string()]);
        assert_eq!(config.embedding, EmbeddingConfig::default());
        assert_eq!(config.clustering.algorithm, ClusterAlgorithm::Optics);
        assert_eq!(
            config.clustering.dims,
            vec![
                ClusterDimension::X,
                ClusterDimension::Y,
                ClusterDimension::Feature(0)
            ]
        );
        assert_eq!(config.clustering.max_eps, Some(2.5));
        assert_eq!(config.clustering.metric, DistanceMetric::Manhattan);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = MapperConfig::default();
        config.corpus.min_length = 0;
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));

        let mut config = MapperConfig::default();
        config.embedding.feature_size = 0;
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));

        let mut config = MapperConfig::default();
        config.clustering.dims.clear();
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));

        let mut config = MapperConfig::default();
        config.projection.iterations = 250;
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));

        let mut config = MapperConfig::default();
        config.clustering.min_samples = 1;
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));

        let mut config = MapperConfig::default();
        config.clustering.algorithm = ClusterAlgorithm::Optics;
        config.clustering.max_eps = Some(1.0);
        config.clustering.eps = Some(2.0);
        assert!(matches!(config.validate(), Err(MapperError::Configuration(_))));
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let err = MapperConfig::from_toml_str("[clustering]\ndims = [\"z\"]\n").unwrap_err();
        assert!(matches!(err, MapperError::TomlError(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = MapperConfig::default();
        config.clustering.eps = Some(0.75);
        config.embedding.alignment = AlignmentPolicy::Intersect;

        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[embedding]"));
        assert!(!toml.contains("max_eps"));
        assert_eq!(MapperConfig::from_toml_str(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[embedding]\nfeature_size = 16\nseed = 7").unwrap();

        let config = MapperConfig::load(file.path()).unwrap();
        assert_eq!(config.embedding.feature_size, 16);
        assert_eq!(config.embedding.seed, 7);
        assert_eq!(config.embedding.skip_gram().unwrap().params().feature_size, 16);
    }

    #[test]
    fn test_load_missing_file() {
        let err = MapperConfig::load("/nonexistent/bmap.toml").unwrap_err();
        assert!(matches!(err, MapperError::Io(_)));
    }
}

//! Pipeline orchestration
//!
//! This module provides the public API for Behavior Mapper.
//! It composes the stages from raw activity records to a clustered behavior map:
//! create corpus → fit sequences → cluster activities.

use crate::activities::ActivityTable;
use crate::cluster::{cluster, DensityClusterer};
use crate::config::{CorpusConfig, MapperConfig};
use crate::embedding::{fit_embeddings, AlignmentPolicy, SequenceEmbedder};
use crate::encoder::{ClusterReport, ReportEncoder};
use crate::error::{MapperError, Stage};
use crate::loader::ActivityLoader;
use crate::projection::{add_volume, reduce_dimensions, Projector};
use crate::types::{ClusterDimension, ClusterTable, SequenceCorpus};
use tracing::info;

/// Build the sequence corpus from raw activity records.
///
/// Removes activities matching `drop_activities`, builds the activity
/// dictionaries, maps IDs and sequences each session.
pub fn create_corpus(
    table: &ActivityTable,
    config: &CorpusConfig,
) -> Result<SequenceCorpus, MapperError> {
    let drop = if config.drop_activities.is_empty() {
        None
    } else {
        Some(config.drop_activities.as_slice())
    };
    let corpus = table.create_corpus(config.min_length, drop, config.collapse_repeats)?;

    info!(
        records = table.len(),
        sequences = corpus.len(),
        activities = corpus.activity_map.len(),
        "created sequence corpus"
    );
    Ok(corpus)
}

/// Embed, project and volume-weight the corpus activities.
///
/// Pipeline stages:
/// 1. SequenceEmbedder - Learn a vector per activity ID, join onto labels
/// 2. Projector - Reduce the vectors to x, y
/// 3. add_volume - Attach the session-volume percentile
///
/// Failures are wrapped with the stage they came from.
pub fn fit_sequences<E, P>(
    corpus: &SequenceCorpus,
    embedder: &E,
    projector: &P,
    policy: AlignmentPolicy,
) -> Result<ClusterTable, MapperError>
where
    E: SequenceEmbedder + ?Sized,
    P: Projector + ?Sized,
{
    let embeddings =
        fit_embeddings(corpus, embedder, policy).map_err(|e| e.in_stage(Stage::Embedding))?;

    let table = reduce_dimensions(embeddings, projector)
        .and_then(|table| add_volume(table, &corpus.activity_counts))
        .map_err(|e| e.in_stage(Stage::Projection))?;

    Ok(table)
}

/// Cluster the fitted table on the given columns
pub fn cluster_activities<C>(
    table: ClusterTable,
    dims: &[ClusterDimension],
    clusterer: &C,
) -> Result<ClusterTable, MapperError>
where
    C: DensityClusterer + ?Sized,
{
    cluster(table, dims, clusterer).map_err(|e| e.in_stage(Stage::Clustering))
}

/// Convert a JSON array of activity records to a cluster report (stateless, one-shot).
///
/// # Arguments
/// * `records_json` - JSON array of `{session_id, activity, occurrence}` records
/// * `config` - Pipeline configuration
///
/// # Returns
/// Cluster report JSON
///
/// # Example
/// ```ignore
/// let report_json = map_behavior(records_json, &MapperConfig::default())?;
/// ```
pub fn map_behavior(records_json: &str, config: &MapperConfig) -> Result<String, MapperError> {
    BehaviorMapper::with_config(config.clone())?.map_json(records_json)
}

/// Configured mapper running the whole pipeline.
///
/// Holds one report encoder so every report from the same mapper shares an
/// instance ID.
pub struct BehaviorMapper {
    config: MapperConfig,
    encoder: ReportEncoder,
}

impl Default for BehaviorMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl BehaviorMapper {
    /// Create a mapper with default settings
    pub fn new() -> Self {
        Self {
            config: MapperConfig::default(),
            encoder: ReportEncoder::new(),
        }
    }

    /// Create a mapper from a validated configuration
    pub fn with_config(config: MapperConfig) -> Result<Self, MapperError> {
        config.validate()?;
        Ok(Self {
            config,
            encoder: ReportEncoder::new(),
        })
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Build the sequence corpus
    pub fn corpus(&self, table: &ActivityTable) -> Result<SequenceCorpus, MapperError> {
        create_corpus(table, &self.config.corpus)
    }

    /// Embed, project and volume-weight a corpus
    pub fn fit(&self, corpus: &SequenceCorpus) -> Result<ClusterTable, MapperError> {
        let embedder = self
            .config
            .embedding
            .skip_gram()
            .map_err(|e| e.in_stage(Stage::Embedding))?;
        let projector = self
            .config
            .tsne()
            .map_err(|e| e.in_stage(Stage::Projection))?;
        fit_sequences(corpus, &embedder, &projector, self.config.embedding.alignment)
    }

    /// Cluster a fitted table
    pub fn cluster(&self, table: ClusterTable) -> Result<ClusterTable, MapperError> {
        let clusterer = self
            .config
            .clustering
            .clusterer()
            .map_err(|e| e.in_stage(Stage::Clustering))?;
        cluster_activities(table, &self.config.clustering.dims, clusterer.as_ref())
    }

    /// Run every stage on the table
    pub fn run(&self, table: &ActivityTable) -> Result<ClusterTable, MapperError> {
        let corpus = self.corpus(table)?;
        let fitted = self.fit(&corpus)?;
        self.cluster(fitted)
    }

    /// Run every stage and wrap the result in a report
    pub fn run_report(&self, table: &ActivityTable) -> Result<ClusterReport, MapperError> {
        let clustered = self.run(table)?;
        self.encoder.encode(&clustered)
    }

    /// Parse a JSON array of records, run every stage and return the report JSON
    pub fn map_json(&self, records_json: &str) -> Result<String, MapperError> {
        let table = ActivityLoader::parse_array(records_json)?;
        let clustered = self.run(&table)?;
        self.encoder.encode_to_json(&clustered, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::tests::sample_table;
    use crate::config::ClusterAlgorithm;
    use crate::embedding::{SkipGram, SkipGramParams, TokenVectors};
    use crate::error::ErrorKind;
    use crate::projection::{Tsne, TsneParams};
    use crate::types::NOISE;
    use pretty_assertions::assert_eq;

    fn small_config() -> MapperConfig {
        let mut config = MapperConfig::default();
        config.embedding.feature_size = 8;
        config.embedding.epochs = 20;
        config.projection.iterations = 300;
        config.projection.perplexity = 1.0;
        config
    }

    fn small_embedder() -> SkipGram {
        SkipGram::new(SkipGramParams {
            feature_size: 8,
            ..SkipGramParams::default()
        })
        .unwrap()
    }

    fn small_projector() -> Tsne {
        Tsne::new(TsneParams {
            iterations: 300,
            perplexity: 1.0,
            ..TsneParams::default()
        })
        .unwrap()
    }

    /// Embedder that only knows activity 0
    struct OneTokenEmbedder;

    impl SequenceEmbedder for OneTokenEmbedder {
        fn embed(&self, _corpus: &[Vec<String>]) -> Result<TokenVectors, MapperError> {
            Ok([("0".to_string(), vec![1.0, 2.0])].into_iter().collect())
        }
    }

    #[test]
    fn test_create_corpus_collapses_and_orders() {
        let corpus = create_corpus(&sample_table(), &CorpusConfig::default()).unwrap();

        let sequences: Vec<(&str, &str, usize)> = corpus
            .sequences
            .iter()
            .map(|s| (s.session_id.as_str(), s.sequence.as_str(), s.step_count))
            .collect();
        // login=0 browse=1 logout=2 purchase=3
        assert_eq!(sequences, vec![("A", "0 1 3", 3), ("B", "0 1 2", 3)]);
        assert_eq!(corpus.activity_counts["login"], 2);
        assert_eq!(corpus.activity_counts["purchase"], 1);
    }

    #[test]
    fn test_create_corpus_drop_pattern() {
        let config = CorpusConfig {
            drop_activities: vec!["logout".to_string()],
            ..CorpusConfig::default()
        };
        let corpus = create_corpus(&sample_table(), &config).unwrap();

        let b = corpus.sequences.iter().find(|s| s.session_id == "B").unwrap();
        assert_eq!(b.tokens.len(), 2);
        assert_eq!(corpus.activity_map.get(b.tokens[0].parse().unwrap()), Some("login"));
        assert_eq!(corpus.activity_map.get(b.tokens[1].parse().unwrap()), Some("browse"));
        assert_eq!(corpus.activity_map.len(), 3);
    }

    #[test]
    fn test_fit_sequences_builds_full_table() {
        let corpus = create_corpus(&sample_table(), &CorpusConfig::default()).unwrap();
        let table = fit_sequences(
            &corpus,
            &small_embedder(),
            &small_projector(),
            AlignmentPolicy::Strict,
        )
        .unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table.feature_size(), 8);
        assert!(table.rows.iter().all(|r| r.x.is_some() && r.y.is_some()));
        let purchase = table.row("purchase").unwrap().volume_pctl.unwrap();
        let login = table.row("login").unwrap().volume_pctl.unwrap();
        assert!(purchase < login);
    }

    #[test]
    fn test_fit_sequences_wraps_embedding_stage() {
        let corpus = create_corpus(&sample_table(), &CorpusConfig::default()).unwrap();
        let err = fit_sequences(
            &corpus,
            &OneTokenEmbedder,
            &small_projector(),
            AlignmentPolicy::Strict,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MapperError::Stage {
                stage: Stage::Embedding,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_fit_sequences_intersect_then_projection_fails() {
        // one surviving activity is too few to calibrate any perplexity
        let corpus = create_corpus(&sample_table(), &CorpusConfig::default()).unwrap();
        let err = fit_sequences(
            &corpus,
            &OneTokenEmbedder,
            &small_projector(),
            AlignmentPolicy::Intersect,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MapperError::Stage {
                stage: Stage::Projection,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_empty_corpus_is_empty_result() {
        let config = CorpusConfig {
            min_length: 10,
            ..CorpusConfig::default()
        };
        let corpus = create_corpus(&sample_table(), &config).unwrap();
        assert!(corpus.is_empty());

        let err = BehaviorMapper::with_config(small_config())
            .unwrap()
            .fit(&corpus)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
        assert!(err.to_string().contains("empty corpus"));
    }

    #[test]
    fn test_mapper_run_labels_every_activity() {
        let mapper = BehaviorMapper::with_config(small_config()).unwrap();
        let clustered = mapper.run(&sample_table()).unwrap();

        assert_eq!(clustered.len(), 4);
        let labels = clustered.labels().unwrap();
        assert!(labels.iter().all(|l| *l >= NOISE));
    }

    #[test]
    fn test_mapper_run_is_reproducible() {
        let mut config = small_config();
        config.clustering.algorithm = ClusterAlgorithm::Optics;
        let mapper = BehaviorMapper::with_config(config).unwrap();

        let first = mapper.run(&sample_table()).unwrap();
        let second = mapper.run(&sample_table()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mapper_cluster_missing_volume_column() {
        let mapper = BehaviorMapper::new();
        let corpus = mapper.corpus(&sample_table()).unwrap();
        let embeddings = fit_embeddings(&corpus, &small_embedder(), AlignmentPolicy::Strict).unwrap();
        let projected = reduce_dimensions(embeddings, &small_projector()).unwrap();

        let err = mapper.cluster(projected).unwrap_err();
        assert!(matches!(
            err,
            MapperError::Stage {
                stage: Stage::Clustering,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let mut config = MapperConfig::default();
        config.corpus.min_length = 0;
        assert!(BehaviorMapper::with_config(config).is_err());
    }

    #[test]
    fn test_map_behavior_json() {
        let records = r#"[
            {"session_id": "A", "activity": "login", "occurrence": "2024-03-01T09:00:00Z"},
            {"session_id": "B", "activity": "login", "occurrence": "2024-03-01T09:01:00Z"},
            {"session_id": "A", "activity": "browse", "occurrence": "2024-03-01T09:02:00Z"},
            {"session_id": "B", "activity": "browse", "occurrence": "2024-03-01T09:03:00Z"},
            {"session_id": "A", "activity": "browse", "occurrence": "2024-03-01T09:04:00Z"},
            {"session_id": "B", "activity": "logout", "occurrence": "2024-03-01T09:05:00Z"},
            {"session_id": "A", "activity": "purchase", "occurrence": "2024-03-01T09:06:00Z"}
        ]"#;
        let json = map_behavior(records, &small_config()).unwrap();
        let report: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(report["producer"]["name"], crate::PRODUCER_NAME);
        assert_eq!(report["activity_count"], 4);
        assert_eq!(report["activities"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_map_behavior_invalid_json() {
        let result = map_behavior("not valid json", &MapperConfig::default());
        assert!(matches!(result, Err(MapperError::JsonError(_))));
    }
}

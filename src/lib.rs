//! Behavior Mapper - Clusters channel activities by how they are used in sessions
//!
//! Raw activity logs flow through a deterministic pipeline: session sequencing →
//! skip-gram activity embeddings → 2D projection → session-volume percentile →
//! density clustering.
//!
//! ## Modules
//!
//! - **Corpus**: [`activities`] and [`sequence`] turn records into per-session token sequences
//! - **Modeling**: [`embedding`], [`projection`] and [`cluster`] build the behavior map
//! - **I/O**: [`loader`] reads records, [`encoder`] writes cluster reports

pub mod activities;
pub mod cluster;
pub mod config;
pub mod embedding;
pub mod encoder;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod projection;
pub mod sequence;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use activities::ActivityTable;
pub use config::MapperConfig;
pub use error::MapperError;
pub use loader::{ActivityLoader, ColumnNames, InputFormat};
pub use pipeline::{cluster_activities, create_corpus, fit_sequences, map_behavior, BehaviorMapper};
pub use types::{ActivityRecord, ClusterTable, SequenceCorpus, NOISE};

/// Crate version embedded in all reports
pub const MAPPER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "behavior-mapper";

//! Error types for Behavior Mapper

use std::fmt;
use thiserror::Error;

/// Pipeline stage a wrapped failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Embedding,
    Projection,
    Clustering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Embedding => "embedding",
            Stage::Projection => "projection",
            Stage::Clustering => "clustering",
        };
        f.write_str(name)
    }
}

/// Coarse failure class, stable across stage wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    DataIntegrity,
    EmptyResult,
    Algorithm,
    Input,
}

/// Errors that can occur while building a behavior map
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Algorithm failure: {0}")]
    Algorithm(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<MapperError>,
    },

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MapperError {
    /// Wrap this error with the name of the stage that produced it
    pub fn in_stage(self, stage: Stage) -> Self {
        MapperError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Failure class, looking through stage wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapperError::Configuration(_) => ErrorKind::Configuration,
            MapperError::DataIntegrity(_) => ErrorKind::DataIntegrity,
            MapperError::EmptyResult(_) => ErrorKind::EmptyResult,
            MapperError::Algorithm(_) => ErrorKind::Algorithm,
            MapperError::Stage { source, .. } => source.kind(),
            MapperError::ParseError(_)
            | MapperError::JsonError(_)
            | MapperError::CsvError(_)
            | MapperError::TomlError(_)
            | MapperError::Io(_) => ErrorKind::Input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wrapping_keeps_kind() {
        let err = MapperError::EmptyResult("empty corpus".to_string()).in_stage(Stage::Embedding);
        assert_eq!(err.kind(), ErrorKind::EmptyResult);
        assert_eq!(
            err.to_string(),
            "embedding stage failed: Empty result: empty corpus"
        );
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err = MapperError::Algorithm("nan gradient".to_string()).in_stage(Stage::Projection);
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "Algorithm failure: nan gradient");
    }
}

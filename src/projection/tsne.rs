//! t-SNE projection, backed by `linfa-tsne`
//!
//! Gaussian input affinities are calibrated per point to the requested
//! perplexity and the 2D map is fitted under a Student-t kernel. During the
//! first `exaggeration_iterations` the affinities are exaggerated and momentum
//! is low. `theta = 0` runs the exact quadratic algorithm, which suits
//! activity vocabularies; larger values switch to Barnes-Hut.

use super::Projector;
use crate::error::MapperError;
use linfa::traits::Transformer;
use linfa_tsne::TSneParams;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// t-SNE hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TsneParams {
    /// Effective number of neighbors; needs `3 * perplexity <= n - 1`
    pub perplexity: f64,
    /// Gradient descent iterations
    pub iterations: usize,
    /// Leading iterations run with exaggerated affinities; must be below `iterations`
    pub exaggeration_iterations: usize,
    /// Barnes-Hut accuracy; 0 is exact
    pub theta: f64,
    /// RNG seed for the initial layout
    pub seed: u64,
}

impl Default for TsneParams {
    fn default() -> Self {
        Self {
            perplexity: 2.0,
            iterations: 1000,
            exaggeration_iterations: 250,
            theta: 0.0,
            seed: 0,
        }
    }
}

impl TsneParams {
    pub fn validate(&self) -> Result<(), MapperError> {
        if !(self.perplexity > 0.0) {
            return Err(MapperError::Configuration(format!(
                "perplexity must be > 0, got {}",
                self.perplexity
            )));
        }
        if self.iterations == 0 {
            return Err(MapperError::Configuration(
                "iterations must be a positive integer".to_string(),
            ));
        }
        if self.exaggeration_iterations >= self.iterations {
            return Err(MapperError::Configuration(format!(
                "iterations ({}) must exceed exaggeration_iterations ({})",
                self.iterations, self.exaggeration_iterations
            )));
        }
        if !(self.theta >= 0.0 && self.theta.is_finite()) {
            return Err(MapperError::Configuration(format!(
                "theta must be a finite value >= 0, got {}",
                self.theta
            )));
        }
        Ok(())
    }

    /// Smallest point count the perplexity can be calibrated on
    pub fn min_points(&self) -> usize {
        (3.0 * self.perplexity).ceil() as usize + 1
    }
}

/// Two-dimensional t-SNE projector
#[derive(Debug, Clone, Default)]
pub struct Tsne {
    params: TsneParams,
}

impl Tsne {
    pub fn new(params: TsneParams) -> Result<Self, MapperError> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Projector for Tsne {
    fn project(&self, data: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, MapperError> {
        self.params.validate()?;
        let n = data.len();
        if n == 0 {
            return Ok(Vec::new());
        }
        if n < self.params.min_points() {
            return Err(MapperError::Configuration(format!(
                "perplexity {} needs at least {} activities, got {}",
                self.params.perplexity,
                self.params.min_points(),
                n
            )));
        }
        let width = data[0].len();
        if data.iter().any(|row| row.len() != width) {
            return Err(MapperError::DataIntegrity(
                "projection input rows differ in length".to_string(),
            ));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(MapperError::DataIntegrity(
                "projection input contains non-finite values".to_string(),
            ));
        }
        if data.iter().all(|row| row == &data[0]) {
            return Err(MapperError::Algorithm(
                "all activities share one embedding; nothing to project".to_string(),
            ));
        }

        // the embedding may not be wider than the input, so pad single columns
        let cols = width.max(2);
        let flat: Vec<f64> = data
            .iter()
            .flat_map(|row| row.iter().copied().chain(std::iter::repeat(0.0).take(cols - width)))
            .collect();
        let records = Array2::from_shape_vec((n, cols), flat)
            .map_err(|e| MapperError::Algorithm(format!("t-SNE input: {}", e)))?;

        let rng = StdRng::seed_from_u64(self.params.seed);
        let map = TSneParams::embedding_size_with_rng(2, rng)
            .perplexity(self.params.perplexity)
            .approx_threshold(self.params.theta)
            .max_iter(self.params.iterations)
            .preliminary_iter(self.params.exaggeration_iterations)
            .transform(records)
            .map_err(|e| MapperError::Algorithm(format!("t-SNE: {}", e)))?;

        if map.iter().any(|v| !v.is_finite()) {
            return Err(MapperError::Algorithm(
                "t-SNE produced non-finite coordinates".to_string(),
            ));
        }
        debug!(points = n, iterations = self.params.iterations, "t-SNE converged");

        Ok(map.outer_iter().map(|row| [row[0], row[1]]).collect())
    }
}

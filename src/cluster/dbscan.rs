//! DBSCAN with a fixed neighborhood radius, backed by `linfa-clustering`

use super::{check_min_samples, label, DensityClusterer, DistanceMetric};
use crate::error::MapperError;
use linfa::traits::Transformer;
use linfa_nn::CommonNearestNeighbour;

/// Fixed-radius density clustering
#[derive(Debug, Clone, PartialEq)]
pub struct Dbscan {
    eps: f64,
    min_samples: usize,
    metric: DistanceMetric,
}

impl Dbscan {
    /// `eps` is the neighborhood radius, inclusive; `min_samples` counts the point itself
    pub fn new(eps: f64, min_samples: usize) -> Result<Self, MapperError> {
        if !(eps > 0.0) {
            return Err(MapperError::Configuration(format!(
                "eps must be > 0, got {}",
                eps
            )));
        }
        check_min_samples(min_samples)?;
        Ok(Self {
            eps,
            min_samples,
            metric: DistanceMetric::default(),
        })
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }
}

impl DensityClusterer for Dbscan {
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<i32>, MapperError> {
        let records = self.metric.records(data)?;
        if records.nrows() == 0 {
            return Ok(Vec::new());
        }

        let memberships = linfa_clustering::Dbscan::params_with(
            self.min_samples,
            self.metric.search_distance(),
            CommonNearestNeighbour::KdTree,
        )
        .tolerance(self.metric.search_radius(self.eps))
        .transform(&records)
        .map_err(|e| MapperError::Configuration(format!("dbscan: {}", e)))?;

        memberships.iter().map(|m| label(*m)).collect()
    }
}

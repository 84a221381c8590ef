//! OPTICS ordering with DBSCAN-style cluster extraction
//!
//! The ordering comes from `linfa-clustering`; extraction at `eps` runs on the
//! resulting reachability plot.

use super::{check_min_samples, DensityClusterer, DistanceMetric};
use crate::error::MapperError;
use crate::types::NOISE;
use linfa::traits::Transformer;
use linfa_nn::distance::Distance;
use linfa_nn::CommonNearestNeighbour;

/// Ordering produced by an OPTICS run
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityPlot {
    /// Point indices in visit order
    pub ordering: Vec<usize>,
    /// Reachability distance per point index; infinite when undefined
    pub reachability: Vec<f64>,
    /// Core distance per point index; infinite when not a core point within `max_eps`
    pub core_distances: Vec<f64>,
}

impl ReachabilityPlot {
    /// Labels equivalent to DBSCAN at radius `eps`
    pub fn extract_dbscan(&self, eps: f64) -> Vec<i32> {
        let n = self.reachability.len();
        let far_reach: Vec<bool> = self
            .reachability
            .iter()
            .map(|r| r.is_infinite() || *r > eps)
            .collect();
        let near_core: Vec<bool> = self
            .core_distances
            .iter()
            .map(|c| c.is_finite() && *c <= eps)
            .collect();

        let mut labels = vec![NOISE; n];
        let mut current = NOISE;
        for &p in &self.ordering {
            if far_reach[p] && near_core[p] {
                current += 1;
            }
            labels[p] = current;
        }
        for p in 0..n {
            if far_reach[p] && !near_core[p] {
                labels[p] = NOISE;
            }
        }
        labels
    }
}

/// Reachability-ordered density clustering
#[derive(Debug, Clone, PartialEq)]
pub struct Optics {
    min_samples: usize,
    max_eps: f64,
    eps: Option<f64>,
    metric: DistanceMetric,
}

impl Optics {
    /// `min_samples` counts the point itself; `max_eps` starts unbounded
    pub fn new(min_samples: usize) -> Result<Self, MapperError> {
        check_min_samples(min_samples)?;
        Ok(Self {
            min_samples,
            max_eps: f64::INFINITY,
            eps: None,
            metric: DistanceMetric::default(),
        })
    }

    pub fn with_max_eps(mut self, max_eps: f64) -> Result<Self, MapperError> {
        if !(max_eps > 0.0) {
            return Err(MapperError::Configuration(format!(
                "max_eps must be > 0, got {}",
                max_eps
            )));
        }
        self.max_eps = max_eps;
        self.check_eps()?;
        Ok(self)
    }

    /// Extraction radius; defaults to `max_eps`
    pub fn with_eps(mut self, eps: f64) -> Result<Self, MapperError> {
        if !(eps > 0.0) {
            return Err(MapperError::Configuration(format!(
                "eps must be > 0, got {}",
                eps
            )));
        }
        self.eps = Some(eps);
        self.check_eps()?;
        Ok(self)
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    fn check_eps(&self) -> Result<(), MapperError> {
        match self.eps {
            Some(eps) if eps > self.max_eps => Err(MapperError::Configuration(format!(
                "eps ({}) must not exceed max_eps ({})",
                eps, self.max_eps
            ))),
            _ => Ok(()),
        }
    }

    fn extraction_eps(&self) -> f64 {
        self.eps.unwrap_or(self.max_eps)
    }

    /// Compute the reachability ordering
    pub fn fit(&self, data: &[Vec<f64>]) -> Result<ReachabilityPlot, MapperError> {
        let records = self.metric.records(data)?;
        let n = records.nrows();
        if n == 0 {
            return Ok(ReachabilityPlot {
                ordering: Vec::new(),
                reachability: Vec::new(),
                core_distances: Vec::new(),
            });
        }

        let search = self.metric.search_distance();
        let max_eps = self.metric.search_radius(self.max_eps);
        let analysis = linfa_clustering::Optics::params_with(
            self.min_samples,
            search,
            CommonNearestNeighbour::KdTree,
        )
        .tolerance(max_eps)
        .transform(records.view())
        .map_err(|e| MapperError::Configuration(format!("optics: {}", e)))?;

        let mut ordering = Vec::with_capacity(n);
        let mut reachability = vec![f64::INFINITY; n];
        let mut core_distances = vec![f64::INFINITY; n];
        for sample in analysis.iter() {
            let p = sample.index();
            // the first point of each expansion is seeded with its own core distance
            let starts_expansion = !ordering.iter().any(|&q: &usize| {
                core_distances[q].is_finite()
                    && search.distance(records.row(q), records.row(p)) <= max_eps
            });
            if let Some(core) = sample.core_distance() {
                core_distances[p] = self.metric.from_search(*core);
            }
            if let (Some(reach), false) = (sample.reachability_distance(), starts_expansion) {
                reachability[p] = self.metric.from_search(*reach);
            }
            ordering.push(p);
        }

        if ordering.len() != n {
            return Err(MapperError::Algorithm(format!(
                "optics ordered {} of {} points",
                ordering.len(),
                n
            )));
        }

        Ok(ReachabilityPlot {
            ordering,
            reachability,
            core_distances,
        })
    }
}

impl DensityClusterer for Optics {
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<i32>, MapperError> {
        Ok(self.fit(data)?.extract_dbscan(self.extraction_eps()))
    }
}

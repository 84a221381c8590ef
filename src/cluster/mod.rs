//! Density-based clustering of the activity map
//!
//! Two algorithms are available:
//!
//! - **DBSCAN**: fixed neighborhood radius `eps`. A point with at least
//!   `min_samples` neighbors (itself included) is a core point; clusters grow
//!   from core points and everything unreachable is noise.
//! - **OPTICS**: orders points by reachability distance up to `max_eps`, then
//!   extracts DBSCAN-equivalent clusters at `eps` from that ordering.
//!
//! Both label noise with [`NOISE`](crate::types::NOISE). Clustering only labels
//! rows; it never removes them.

pub mod dbscan;
pub mod optics;

pub use dbscan::Dbscan;
pub use optics::Optics;

use crate::error::MapperError;
use crate::types::{ClusterDimension, ClusterTable, NOISE};
use linfa_nn::distance::{Distance, L1Dist, L2Dist};
use ndarray::{Array2, ArrayView, Dimension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Density clustering over an n×k matrix
pub trait DensityClusterer {
    /// Return one label per row, `NOISE` for unclustered rows
    fn fit_predict(&self, data: &[Vec<f64>]) -> Result<Vec<i32>, MapperError>;
}

/// Distance between two points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    /// `1 - cosine similarity`
    ///
    /// Searched as euclidean distance between unit-normalized rows, where
    /// `|a - b|² = 2 (1 - cos)`. Zero rows stay at the origin.
    Cosine,
}

impl DistanceMetric {
    /// Row-major records in the space the neighbour index searches
    pub(crate) fn records(&self, data: &[Vec<f64>]) -> Result<Array2<f64>, MapperError> {
        validate_matrix(data)?;
        let width = data.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f64> = match self {
            DistanceMetric::Cosine => data.iter().flat_map(|row| unit(row)).collect(),
            _ => data.iter().flatten().copied().collect(),
        };
        Array2::from_shape_vec((data.len(), width), flat)
            .map_err(|e| MapperError::Algorithm(format!("clustering input: {}", e)))
    }

    pub(crate) fn search_distance(&self) -> SearchDistance {
        match self {
            DistanceMetric::Manhattan => SearchDistance::L1,
            DistanceMetric::Euclidean | DistanceMetric::Cosine => SearchDistance::L2,
        }
    }

    /// Radius in search space covering `radius` in this metric
    pub(crate) fn search_radius(&self, radius: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => (2.0 * radius).sqrt(),
            _ => radius,
        }
    }

    /// Inverse of [`search_radius`](Self::search_radius)
    pub(crate) fn from_search(&self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => distance * distance / 2.0,
            _ => distance,
        }
    }
}

fn unit(row: &[f64]) -> Vec<f64> {
    let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        row.to_vec()
    } else {
        row.iter().map(|v| v / norm).collect()
    }
}

/// Distance handed to the linfa neighbour index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchDistance {
    L1,
    L2,
}

impl Distance<f64> for SearchDistance {
    fn distance<D: Dimension>(&self, a: ArrayView<f64, D>, b: ArrayView<f64, D>) -> f64 {
        match self {
            SearchDistance::L1 => <L1Dist as Distance<f64>>::distance(&L1Dist, a, b),
            SearchDistance::L2 => <L2Dist as Distance<f64>>::distance(&L2Dist, a, b),
        }
    }

    fn rdistance<D: Dimension>(&self, a: ArrayView<f64, D>, b: ArrayView<f64, D>) -> f64 {
        match self {
            SearchDistance::L1 => <L1Dist as Distance<f64>>::rdistance(&L1Dist, a, b),
            SearchDistance::L2 => <L2Dist as Distance<f64>>::rdistance(&L2Dist, a, b),
        }
    }

    fn rdist_to_dist(&self, rdist: f64) -> f64 {
        match self {
            SearchDistance::L1 => rdist,
            SearchDistance::L2 => rdist.sqrt(),
        }
    }

    fn dist_to_rdist(&self, dist: f64) -> f64 {
        match self {
            SearchDistance::L1 => dist,
            SearchDistance::L2 => dist.powi(2),
        }
    }
}

pub(crate) fn validate_matrix(data: &[Vec<f64>]) -> Result<(), MapperError> {
    let width = data.first().map(Vec::len).unwrap_or(0);
    if data.iter().any(|row| row.len() != width) {
        return Err(MapperError::DataIntegrity(
            "clustering input rows differ in length".to_string(),
        ));
    }
    if data.iter().flatten().any(|v| !v.is_finite()) {
        return Err(MapperError::DataIntegrity(
            "clustering input contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// linfa cluster index to table label
pub(crate) fn label(membership: Option<usize>) -> Result<i32, MapperError> {
    membership.map_or(Ok(NOISE), |c| {
        i32::try_from(c).map_err(|_| MapperError::Algorithm(format!("cluster id {} overflows", c)))
    })
}

/// Both linfa clusterers reject a lone point as a neighbourhood
pub(crate) fn check_min_samples(min_samples: usize) -> Result<(), MapperError> {
    if min_samples < 2 {
        return Err(MapperError::Configuration(format!(
            "min_samples must be at least 2, got {}",
            min_samples
        )));
    }
    Ok(())
}

/// Cluster the table on the given columns and store the labels
pub fn cluster<C>(
    mut table: ClusterTable,
    dims: &[ClusterDimension],
    clusterer: &C,
) -> Result<ClusterTable, MapperError>
where
    C: DensityClusterer + ?Sized,
{
    if dims.is_empty() {
        return Err(MapperError::Configuration(
            "cluster dims must name at least one column".to_string(),
        ));
    }
    let feature_size = table.feature_size();
    if let Some(ClusterDimension::Feature(i)) = dims
        .iter()
        .find(|d| matches!(d, ClusterDimension::Feature(i) if *i >= feature_size))
    {
        return Err(MapperError::Configuration(format!(
            "feature column {} out of range (feature size {})",
            i, feature_size
        )));
    }

    let data = table.matrix(dims)?;
    let labels = clusterer.fit_predict(&data)?;
    if labels.len() != table.len() {
        return Err(MapperError::Algorithm(format!(
            "clusterer returned {} labels for {} activities",
            labels.len(),
            table.len()
        )));
    }

    for (row, label) in table.rows.iter_mut().zip(&labels) {
        row.cluster = Some(*label);
    }

    let clusters = labels.iter().filter(|l| **l != NOISE).max().map_or(0, |m| m + 1);
    let noise = labels.iter().filter(|l| **l == NOISE).count();
    debug!(dims = ?dims, "clustered on columns");
    info!(activities = table.len(), clusters, noise, "clustered activities");

    Ok(table)
}

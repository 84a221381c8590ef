//! Projection and volume weighting
//!
//! Reduces activity embeddings to a 2D map and attaches the session-volume
//! percentile of each activity.

pub mod tsne;

pub use tsne::{Tsne, TsneParams};

use crate::error::MapperError;
use crate::types::{ActivityCounts, ClusterTable};
use tracing::debug;

/// Non-linear reduction of an n×d matrix to n×2
pub trait Projector {
    fn project(&self, data: &[Vec<f64>]) -> Result<Vec<[f64; 2]>, MapperError>;
}

/// Project the embedding columns to 2D and store them as `x`, `y`
///
/// Accepts an [`EmbeddingTable`](crate::types::EmbeddingTable) or an existing
/// cluster table. Only the embedding columns feed the projection; an existing
/// volume column is kept and any stale cluster label is cleared.
pub fn reduce_dimensions<T, P>(table: T, projector: &P) -> Result<ClusterTable, MapperError>
where
    T: Into<ClusterTable>,
    P: Projector + ?Sized,
{
    let mut table: ClusterTable = table.into();
    if table.is_empty() {
        return Err(MapperError::EmptyResult(
            "no activities to project".to_string(),
        ));
    }

    let feature_size = table.feature_size();
    if let Some(row) = table.rows.iter().find(|r| r.features.len() != feature_size) {
        return Err(MapperError::DataIntegrity(format!(
            "Activity '{}' has {} features, expected {}",
            row.activity,
            row.features.len(),
            feature_size
        )));
    }

    let data: Vec<Vec<f64>> = table.rows.iter().map(|r| r.features.clone()).collect();
    let coords = projector.project(&data)?;
    if coords.len() != table.len() {
        return Err(MapperError::Algorithm(format!(
            "projector returned {} points for {} activities",
            coords.len(),
            table.len()
        )));
    }

    for (row, [x, y]) in table.rows.iter_mut().zip(coords) {
        row.x = Some(x);
        row.y = Some(y);
        row.cluster = None;
    }

    debug!(activities = table.len(), feature_size, "projected activities to 2D");
    Ok(table)
}

/// Replace raw session counts with their percentile rank across the table
///
/// Ties share the average rank; the percentile is `rank / n * 100`.
pub fn add_volume(
    mut table: ClusterTable,
    activity_counts: &ActivityCounts,
) -> Result<ClusterTable, MapperError> {
    let missing: Vec<&str> = table
        .rows
        .iter()
        .filter(|r| !activity_counts.contains_key(&r.activity))
        .map(|r| r.activity.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(MapperError::DataIntegrity(format!(
            "activity_counts has no entry for: {}",
            missing.join(", ")
        )));
    }

    let counts: Vec<f64> = table
        .rows
        .iter()
        .map(|r| activity_counts[&r.activity] as f64)
        .collect();
    let ranks = percentile_ranks(&counts);

    for (row, pctl) in table.rows.iter_mut().zip(ranks) {
        row.volume_pctl = Some(pctl);
    }
    Ok(table)
}

/// Percentile rank (0-100] of each value, averaging ranks over ties
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // 1-based positions start+1..=end+1
        let avg = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = avg / n as f64 * 100.0;
        }
        start = end + 1;
    }
    ranks
}

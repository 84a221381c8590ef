//! Cluster report encoding
//!
//! Wraps a clustered table with producer metadata and per-cluster summaries
//! for JSON output, or flattens it to one CSV row per activity.

use crate::error::MapperError;
use crate::types::{ClusterRow, ClusterTable, NOISE};
use crate::{MAPPER_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use uuid::Uuid;

/// Current report layout version
pub const REPORT_VERSION: &str = "1.0.0";

/// Who produced a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Members of one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: i32,
    pub size: usize,
    pub activities: Vec<String>,
}

/// Behavior map with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub run_id: String,
    pub computed_at_utc: DateTime<Utc>,
    pub activity_count: usize,
    pub cluster_count: usize,
    pub noise_count: usize,
    /// Clusters in label order, noise excluded
    pub clusters: Vec<ClusterSummary>,
    pub activities: Vec<ClusterRow>,
}

/// Report encoder with a stable instance ID
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode a cluster table into a report
    pub fn encode(&self, table: &ClusterTable) -> Result<ClusterReport, MapperError> {
        if table.is_empty() {
            return Err(MapperError::EmptyResult(
                "no activities to report".to_string(),
            ));
        }

        let mut members: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        let mut noise_count = 0;
        for row in &table.rows {
            match row.cluster {
                Some(NOISE) => noise_count += 1,
                Some(label) => members.entry(label).or_default().push(row.activity.clone()),
                None => {}
            }
        }
        let clusters: Vec<ClusterSummary> = members
            .into_iter()
            .map(|(cluster, activities)| ClusterSummary {
                cluster,
                size: activities.len(),
                activities,
            })
            .collect();

        Ok(ClusterReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: MAPPER_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            run_id: Uuid::new_v4().to_string(),
            computed_at_utc: Utc::now(),
            activity_count: table.len(),
            cluster_count: clusters.len(),
            noise_count,
            clusters,
            activities: table.rows.clone(),
        })
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, table: &ClusterTable, pretty: bool) -> Result<String, MapperError> {
        let report = self.encode(table)?;
        let json = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        Ok(json)
    }
}

/// Write one CSV row per activity: label, projection, volume, cluster, then features
pub fn write_csv<W: Write>(table: &ClusterTable, writer: W) -> Result<(), MapperError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![
        "activity".to_string(),
        "x".to_string(),
        "y".to_string(),
        "volume_pctl".to_string(),
        "cluster".to_string(),
    ];
    header.extend((0..table.feature_size()).map(|i| format!("f{}", i)));
    wtr.write_record(&header)?;

    fn cell<T: ToString>(value: Option<T>) -> String {
        value.map(|v| v.to_string()).unwrap_or_default()
    }

    for row in &table.rows {
        let mut record = vec![
            row.activity.clone(),
            cell(row.x),
            cell(row.y),
            cell(row.volume_pctl),
            cell(row.cluster),
        ];
        record.extend(row.features.iter().map(|f| f.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

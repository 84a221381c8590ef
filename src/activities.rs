//! Activity table
//!
//! Typed table of (session, activity, occurrence) records. Owns pattern-based
//! filtering and the construction of the activity dictionaries. Every operation
//! returns a new table; the input is never modified.

use crate::error::MapperError;
use crate::sequence::SequenceBuilder;
use crate::types::{
    ActivityCounts, ActivityMap, ActivityRecord, SequenceCorpus, SessionSequence,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Records of user activity grouped by session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTable {
    records: Vec<ActivityRecord>,
}

impl ActivityTable {
    pub fn new(records: Vec<ActivityRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of distinct session IDs
    pub fn session_count(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.session_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Distinct activity labels in first-seen order
    pub fn distinct_activities(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|r| r.activity.as_str())
            .filter(|a| seen.insert(*a))
            .collect()
    }

    /// Whether every record carries an activity ID
    pub fn is_mapped(&self) -> bool {
        self.records.iter().all(|r| r.activity_id.is_some())
    }

    /// Remove every record whose activity contains any of the patterns
    ///
    /// Matching is a case-sensitive substring test; a record is dropped when at
    /// least one pattern matches. Removing every record is an error since no
    /// later stage can work without activities.
    pub fn remove_activities<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Self, MapperError> {
        if patterns.is_empty() {
            return Err(MapperError::Configuration(
                "drop_activities must contain at least one pattern".to_string(),
            ));
        }
        if patterns.iter().any(|p| p.as_ref().is_empty()) {
            return Err(MapperError::Configuration(
                "drop_activities patterns must be non-empty strings".to_string(),
            ));
        }

        let records: Vec<ActivityRecord> = self
            .records
            .iter()
            .filter(|r| !patterns.iter().any(|p| r.activity.contains(p.as_ref())))
            .cloned()
            .collect();

        debug!(
            before = self.records.len(),
            after = records.len(),
            "removed matching activities"
        );

        if records.is_empty() {
            return Err(MapperError::EmptyResult(
                "All activities matched those specified in drop_activities".to_string(),
            ));
        }

        Ok(Self { records })
    }

    /// Build the activity dictionary and the per-activity session counts
    ///
    /// IDs are assigned from 0 in the order labels are first seen.
    pub fn build_dictionaries(&self) -> (ActivityMap, ActivityCounts) {
        let activity_map = ActivityMap::from_labels(self.records.iter().map(|r| r.activity.as_str()));

        let mut sessions: HashMap<&str, HashSet<&str>> = HashMap::new();
        for record in &self.records {
            sessions
                .entry(record.activity.as_str())
                .or_default()
                .insert(record.session_id.as_str());
        }
        let activity_counts: ActivityCounts = sessions
            .into_iter()
            .map(|(activity, ids)| (activity.to_string(), ids.len() as u64))
            .collect();

        debug!(activities = activity_map.len(), "built activity dictionaries");
        (activity_map, activity_counts)
    }

    /// Populate activity IDs from a dictionary
    pub fn map_activity_ids(&self, activity_map: &ActivityMap) -> Result<Self, MapperError> {
        let distinct = self.distinct_activities().len();
        if distinct != activity_map.len() {
            return Err(MapperError::DataIntegrity(format!(
                "Table has {} distinct activities but activity_map has {} entries",
                distinct,
                activity_map.len()
            )));
        }

        let inverse = activity_map.inverse();
        let records = self
            .records
            .iter()
            .map(|r| {
                let id = inverse.get(r.activity.as_str()).copied().ok_or_else(|| {
                    MapperError::DataIntegrity(format!(
                        "Activity '{}' is not present in activity_map",
                        r.activity
                    ))
                })?;
                Ok(ActivityRecord {
                    activity_id: Some(id),
                    ..r.clone()
                })
            })
            .collect::<Result<Vec<_>, MapperError>>()?;

        Ok(Self { records })
    }

    /// Build per-session token sequences
    ///
    /// Convenience wrapper over [`SequenceBuilder`]; the table must already be
    /// mapped.
    pub fn build_sequences(
        &self,
        min_length: usize,
        collapse_repeats: bool,
    ) -> Result<Vec<SessionSequence>, MapperError> {
        SequenceBuilder::new(min_length)?
            .collapse_repeats(collapse_repeats)
            .build(self)
    }

    /// Filter, build dictionaries, map IDs and sequence in one step
    pub fn create_corpus<S: AsRef<str>>(
        &self,
        min_length: usize,
        drop_activities: Option<&[S]>,
        collapse_repeats: bool,
    ) -> Result<SequenceCorpus, MapperError> {
        if self.records.is_empty() {
            return Err(MapperError::EmptyResult(
                "Activity table has no records".to_string(),
            ));
        }

        let filtered = match drop_activities {
            Some(patterns) => self.remove_activities(patterns)?,
            None => self.clone(),
        };

        let (activity_map, activity_counts) = filtered.build_dictionaries();
        let mapped = filtered.map_activity_ids(&activity_map)?;
        let sequences = mapped.build_sequences(min_length, collapse_repeats)?;

        Ok(SequenceCorpus {
            sequences,
            activity_map,
            activity_counts,
        })
    }
}

impl From<Vec<ActivityRecord>> for ActivityTable {
    fn from(records: Vec<ActivityRecord>) -> Self {
        Self::new(records)
    }
}

impl FromIterator<ActivityRecord> for ActivityTable {
    fn from_iter<T: IntoIterator<Item = ActivityRecord>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

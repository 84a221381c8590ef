//! Session sequence construction
//!
//! Groups mapped activity records by session, orders them by occurrence and
//! turns them into token sequences for the embedding stage.

use crate::activities::ActivityTable;
use crate::error::MapperError;
use crate::types::{ActivityRecord, SessionSequence};
use std::collections::BTreeMap;
use tracing::debug;

/// Builds per-session token sequences from a mapped activity table
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    min_length: usize,
    collapse_repeats: bool,
}

impl SequenceBuilder {
    /// Create a builder that keeps sequences of at least `min_length` steps
    pub fn new(min_length: usize) -> Result<Self, MapperError> {
        if min_length == 0 {
            return Err(MapperError::Configuration(
                "min_length must be a positive integer".to_string(),
            ));
        }
        Ok(Self {
            min_length,
            collapse_repeats: true,
        })
    }

    /// Merge consecutive duplicate tokens into one (default: true)
    pub fn collapse_repeats(mut self, collapse: bool) -> Self {
        self.collapse_repeats = collapse;
        self
    }

    /// Build sequences for every session that meets the minimum length
    ///
    /// Sessions come out in ascending session ID order. Records with equal
    /// occurrence keep their original table order.
    pub fn build(&self, table: &ActivityTable) -> Result<Vec<SessionSequence>, MapperError> {
        let mut by_session: BTreeMap<&str, Vec<&ActivityRecord>> = BTreeMap::new();
        for record in table.records() {
            by_session
                .entry(record.session_id.as_str())
                .or_default()
                .push(record);
        }

        let total_sessions = by_session.len();
        let mut sequences = Vec::with_capacity(total_sessions);

        for (session_id, mut records) in by_session {
            // stable: ties keep table order
            records.sort_by_key(|r| r.occurrence);

            let tokens = records
                .iter()
                .map(|r| {
                    r.activity_id.map(|id| id.to_string()).ok_or_else(|| {
                        MapperError::DataIntegrity(format!(
                            "Activity '{}' in session '{}' has no activity_id; map the table first",
                            r.activity, session_id
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let tokens = if self.collapse_repeats {
                collapse_repeats(tokens)
            } else {
                tokens
            };

            if tokens.len() >= self.min_length {
                sequences.push(SessionSequence::new(session_id, tokens));
            }
        }

        debug!(
            sessions = total_sessions,
            retained = sequences.len(),
            min_length = self.min_length,
            "built session sequences"
        );

        Ok(sequences)
    }
}

/// Merge runs of identical adjacent tokens into a single token
pub fn collapse_repeats<T: PartialEq>(mut tokens: Vec<T>) -> Vec<T> {
    tokens.dedup();
    tokens
}

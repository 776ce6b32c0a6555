//! Analysis history storage: trait plus in-memory ring buffer.

use crate::classify::ThreatLevel;
use crate::record::AnalysisRecord;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

/// Filter for history listings. Results are always newest first.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisQuery {
    pub threat_level: Option<ThreatLevel>,
    /// Case-insensitive substring of subject or sender
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl AnalysisQuery {
    /// Whether a record passes the level and search filters.
    #[must_use]
    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        if self.threat_level.is_some_and(|level| level != record.threat_level) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                record.subject.to_lowercase().contains(&needle)
                    || record.sender.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Count of stored analyses per threat level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatStats {
    pub total: usize,
    pub safe: usize,
    pub suspicious: usize,
    pub phishing: usize,
    pub malicious: usize,
    pub tampering: usize,
}

impl ThreatStats {
    /// Record one analysis of the given level.
    pub fn add(&mut self, level: ThreatLevel) {
        self.total += 1;
        match level {
            ThreatLevel::Safe => self.safe += 1,
            ThreatLevel::Suspicious => self.suspicious += 1,
            ThreatLevel::Phishing => self.phishing += 1,
            ThreatLevel::Malicious => self.malicious += 1,
            ThreatLevel::Tampering => self.tampering += 1,
        }
    }
}

impl FromIterator<ThreatLevel> for ThreatStats {
    fn from_iter<I: IntoIterator<Item = ThreatLevel>>(iter: I) -> Self {
        let mut stats = Self::default();
        for level in iter {
            stats.add(level);
        }
        stats
    }
}

/// Storage backend for analysis records.
pub trait AnalysisStorage: Send + Sync {
    /// Store a record, evicting the oldest beyond capacity.
    fn push(&self, record: AnalysisRecord);
    /// Filtered records, newest first.
    fn query(&self, query: &AnalysisQuery) -> Vec<AnalysisRecord>;
    fn get_by_id(&self, id: &str) -> Option<AnalysisRecord>;
    /// Returns true if the record existed.
    fn remove(&self, id: &str) -> bool;
    fn clear(&self);
    fn stats(&self) -> ThreatStats;
    /// Flush pending writes before shutdown.
    fn close(&self) {}
}

/// In-memory store with a maximum capacity (ring buffer).
pub struct AnalysisStore {
    max: usize,
    records: RwLock<VecDeque<AnalysisRecord>>,
}

impl AnalysisStore {
    /// Create a new store with the given maximum capacity.
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self {
            max,
            records: RwLock::new(VecDeque::new()),
        }
    }
}

impl AnalysisStorage for AnalysisStore {
    fn push(&self, record: AnalysisRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push_front(record);
        records.truncate(self.max);
    }

    fn query(&self, query: &AnalysisQuery) -> Vec<AnalysisRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .iter()
            .filter(|r| query.matches(r))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn get_by_id(&self, id: &str) -> Option<AnalysisRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|r| r.id == id).cloned()
    }

    fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return false;
        };
        records.remove(pos);
        true
    }

    fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn stats(&self) -> ThreatStats {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().map(|r| r.threat_level).collect()
    }
}

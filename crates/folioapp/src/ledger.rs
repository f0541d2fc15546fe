//! # Version Ledger
//!
//! A bounded, newest-first history of whole-document snapshots.
//!
//! - [`VersionLedger::append`] prepends and evicts the oldest entry once the cap
//!   is exceeded, so `len() <= cap` always holds.
//! - Entries carry a monotonic `seq`. Ordering never depends on wall-clock
//!   timestamps alone: two versions created in the same instant still sort by
//!   insertion order.
//! - [`VersionLedger::restore`] only reads. Bringing old content back is an
//!   ordinary edit that the next save records as a fresh version.

use std::collections::VecDeque;
use uuid::Uuid;

use crate::error::{FolioError, Result};
use crate::model::{Snapshot, Version};

pub const DEFAULT_MAX_VERSIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct VersionLedger {
    versions: VecDeque<Version>,
    cap: usize,
    next_seq: u64,
}

impl Default for VersionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VERSIONS)
    }
}

impl VersionLedger {
    pub fn new(cap: usize) -> Self {
        Self {
            versions: VecDeque::new(),
            cap: cap.max(1),
            next_seq: 1,
        }
    }

    /// Rebuild from persisted versions in any order.
    pub fn from_versions(mut versions: Vec<Version>, cap: usize) -> Self {
        // Older files may lack `seq`; fall back to timestamps for those.
        versions.sort_by(|a, b| {
            b.seq
                .cmp(&a.seq)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        let next_seq = versions.iter().map(|v| v.seq).max().unwrap_or(0) + 1;
        let mut ledger = Self {
            versions: versions.into(),
            cap: cap.max(1),
            next_seq,
        };
        ledger.evict();
        ledger
    }

    pub fn append(&mut self, content: Snapshot, is_auto_save: bool) -> Version {
        let version = Version::new(self.next_seq, content, is_auto_save);
        self.next_seq += 1;
        self.versions.push_front(version.clone());
        self.evict();
        version
    }

    fn evict(&mut self) {
        while self.versions.len() > self.cap {
            self.versions.pop_back();
        }
    }

    /// Newest first.
    pub fn list(&self) -> impl Iterator<Item = &Version> + '_ {
        self.versions.iter()
    }

    pub fn to_vec(&self) -> Vec<Version> {
        self.versions.iter().cloned().collect()
    }

    pub fn newest(&self) -> Option<&Version> {
        self.versions.front()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == *id)
    }

    pub fn restore(&self, id: &Uuid) -> Result<Snapshot> {
        self.get(id)
            .map(|v| v.content.clone())
            .ok_or(FolioError::VersionNotFound(*id))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snap(n: u64) -> Snapshot {
        Snapshot::new(json!({ "n": n }))
    }

    #[test]
    fn append_prepends_newest_first() {
        let mut ledger = VersionLedger::new(10);
        ledger.append(snap(1), false);
        ledger.append(snap(2), true);

        let contents: Vec<_> = ledger.list().map(|v| v.content.clone()).collect();
        assert_eq!(contents, vec![snap(2), snap(1)]);
        assert!(ledger.newest().unwrap().is_auto_save);
    }

    #[test]
    fn cap_evicts_oldest() {
        let mut ledger = VersionLedger::new(3);
        for n in 0..7 {
            ledger.append(snap(n), true);
            assert!(ledger.len() <= 3);
        }
        let contents: Vec<_> = ledger.list().map(|v| v.content.clone()).collect();
        assert_eq!(contents, vec![snap(6), snap(5), snap(4)]);
    }

    #[test]
    fn default_cap_is_ten() {
        let mut ledger = VersionLedger::default();
        for n in 0..25 {
            ledger.append(snap(n), false);
        }
        assert_eq!(ledger.len(), 10);
        assert_eq!(ledger.newest().unwrap().content, snap(24));
    }

    #[test]
    fn list_is_restartable() {
        let mut ledger = VersionLedger::new(5);
        ledger.append(snap(1), false);
        ledger.append(snap(2), false);

        let first: Vec<_> = ledger.list().map(|v| v.id).collect();
        let second: Vec<_> = ledger.list().map(|v| v.id).collect();
        assert_eq!(first, second);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn restore_does_not_mutate() {
        let mut ledger = VersionLedger::new(5);
        let old = ledger.append(snap(1), false);
        ledger.append(snap(2), false);

        assert_eq!(ledger.restore(&old.id).unwrap(), snap(1));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.newest().unwrap().content, snap(2));
    }

    #[test]
    fn restore_unknown_version_fails() {
        let ledger = VersionLedger::new(5);
        let missing = Uuid::new_v4();
        assert!(matches!(
            ledger.restore(&missing),
            Err(FolioError::VersionNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn seq_breaks_timestamp_ties() {
        let mut ledger = VersionLedger::new(5);
        let a = ledger.append(snap(1), false);
        let mut b = ledger.append(snap(2), false);
        b.created_at = a.created_at;

        // Feed them back oldest-first with identical timestamps.
        let rebuilt = VersionLedger::from_versions(vec![a.clone(), b.clone()], 5);
        let ids: Vec<_> = rebuilt.list().map(|v| v.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn from_versions_truncates_and_continues_sequence() {
        let mut source = VersionLedger::new(10);
        for n in 0..6 {
            source.append(snap(n), false);
        }
        let mut rebuilt = VersionLedger::from_versions(source.to_vec(), 4);
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(rebuilt.newest().unwrap().content, snap(5));

        let next = rebuilt.append(snap(99), true);
        assert_eq!(next.seq, 7);
        assert_eq!(rebuilt.len(), 4);
    }
}

//! Staging buffer for extracted records
//!
//! The buffer is the only writable copy of records that are not yet
//! committed. It is ordered and position-indexed, edits replace whole
//! records, and the only way an entry leaves is `remove_at`/`remove_by_key`,
//! a successful commit, or an explicit discard.
//!
//! Each entry also carries a staging key, assigned once when the buffer is
//! built. Keys do not shift when earlier entries are removed, so a UI that
//! holds on to a row across removals can address it by key instead of by a
//! possibly stale index.

use crate::models::{ImportRecord, JobId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StagingError {
    #[error("Index {index} out of bounds (size {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("No staged record with key {0}")]
    UnknownKey(u64),
}

/// Record plus its staging key
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    key: u64,
    record: ImportRecord,
}

impl StagedRecord {
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn record(&self) -> &ImportRecord {
        &self.record
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagingBuffer {
    source_job: Option<JobId>,
    entries: Vec<StagedRecord>,
}

impl StagingBuffer {
    /// Stage records in the order the backend returned them; keys are 0..n
    pub fn from_records(source_job: Option<JobId>, records: Vec<ImportRecord>) -> Self {
        let entries = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| StagedRecord {
                key: i as u64,
                record,
            })
            .collect();

        Self {
            source_job,
            entries,
        }
    }

    /// Job the records were extracted by
    pub fn source_job(&self) -> Option<&JobId> {
        self.source_job.as_ref()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ImportRecord> {
        self.entries.get(index).map(|e| &e.record)
    }

    pub fn key_at(&self, index: usize) -> Option<u64> {
        self.entries.get(index).map(|e| e.key)
    }

    /// Current position of the entry with `key`
    pub fn index_of(&self, key: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedRecord> {
        self.entries.iter()
    }

    /// Overwrite the record at `index`, returning the previous one
    ///
    /// No field validation happens here; an empty name is accepted.
    pub fn replace(&mut self, index: usize, record: ImportRecord) -> Result<ImportRecord, StagingError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(StagingError::IndexOutOfBounds { index, len })?;
        Ok(std::mem::replace(&mut entry.record, record))
    }

    /// Remove the record at `index`; later entries shift down, order is kept
    pub fn remove_at(&mut self, index: usize) -> Result<ImportRecord, StagingError> {
        let len = self.entries.len();
        if index >= len {
            return Err(StagingError::IndexOutOfBounds { index, len });
        }
        Ok(self.entries.remove(index).record)
    }

    /// Remove several entries, each `position` addressing the buffer as it is
    /// before any removal
    ///
    /// Duplicate positions count once. Every position is checked first; if
    /// any is out of range nothing is removed. Removed records come back in
    /// their original order.
    pub fn remove_positions(
        &mut self,
        positions: &[usize],
    ) -> Result<Vec<(usize, ImportRecord)>, StagingError> {
        let len = self.entries.len();
        if let Some(&index) = positions.iter().find(|&&index| index >= len) {
            return Err(StagingError::IndexOutOfBounds { index, len });
        }

        let mut positions = positions.to_vec();
        positions.sort_unstable();
        positions.dedup();

        let mut removed: Vec<(usize, ImportRecord)> = positions
            .into_iter()
            .rev()
            .map(|index| (index, self.entries.remove(index).record))
            .collect();
        removed.reverse();
        Ok(removed)
    }

    pub fn replace_by_key(&mut self, key: u64, record: ImportRecord) -> Result<ImportRecord, StagingError> {
        let index = self.index_of(key).ok_or(StagingError::UnknownKey(key))?;
        self.replace(index, record)
    }

    pub fn remove_by_key(&mut self, key: u64) -> Result<ImportRecord, StagingError> {
        let index = self.index_of(key).ok_or(StagingError::UnknownKey(key))?;
        self.remove_at(index)
    }

    /// Current contents in order, as sent on commit
    pub fn to_records(&self) -> Vec<ImportRecord> {
        self.entries.iter().map(|e| e.record.clone()).collect()
    }

    /// Drop every entry (after commit or explicit discard)
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(buffer: &StagingBuffer) -> Vec<String> {
        buffer
            .iter()
            .map(|e| e.record().display_name().to_string())
            .collect()
    }

    fn abc() -> StagingBuffer {
        StagingBuffer::from_records(
            JobId::parse("job-1"),
            vec![
                ImportRecord::named("A"),
                ImportRecord::named("B"),
                ImportRecord::named("C"),
            ],
        )
    }

    #[test]
    fn test_remove_at_preserves_order() {
        let mut buffer = abc();
        let removed = buffer.remove_at(1).unwrap();

        assert_eq!(removed.display_name(), "B");
        assert_eq!(buffer.size(), 2);
        assert_eq!(names(&buffer), vec!["A", "C"]);
    }

    #[test]
    fn test_bounds_checked() {
        let mut buffer = abc();
        assert_eq!(
            buffer.remove_at(3),
            Err(StagingError::IndexOutOfBounds { index: 3, len: 3 })
        );
        assert_eq!(
            buffer.replace(5, ImportRecord::named("X")),
            Err(StagingError::IndexOutOfBounds { index: 5, len: 3 })
        );
        assert_eq!(buffer.size(), 3);
    }

    #[test]
    fn test_remove_positions_use_original_indices() {
        let mut buffer = StagingBuffer::from_records(
            None,
            ["A", "B", "C", "D"].into_iter().map(ImportRecord::named).collect(),
        );

        let removed = buffer.remove_positions(&[1, 3, 1]).unwrap();

        let removed: Vec<(usize, &str)> = removed
            .iter()
            .map(|(index, record)| (*index, record.display_name()))
            .collect();
        assert_eq!(removed, vec![(1, "B"), (3, "D")]);
        assert_eq!(names(&buffer), vec!["A", "C"]);
    }

    #[test]
    fn test_remove_positions_all_or_nothing() {
        let mut buffer = abc();
        assert_eq!(
            buffer.remove_positions(&[0, 3]),
            Err(StagingError::IndexOutOfBounds { index: 3, len: 3 })
        );
        assert_eq!(names(&buffer), vec!["A", "B", "C"]);

        assert_eq!(buffer.remove_positions(&[]).unwrap(), Vec::new());
        assert_eq!(buffer.size(), 3);
    }

    #[test]
    fn test_replace_whole_record() {
        let mut buffer = abc();
        let mut edited = buffer.get(0).cloned().unwrap();
        edited.name = Some(String::new());
        edited.voter_no = Some("001".to_string());

        let previous = buffer.replace(0, edited.clone()).unwrap();
        assert_eq!(previous.display_name(), "A");
        assert_eq!(buffer.get(0), Some(&edited));
        assert_eq!(buffer.size(), 3);
    }

    #[test]
    fn test_keys_survive_removal() {
        let mut buffer = abc();
        let key_c = buffer.key_at(2).unwrap();

        buffer.remove_at(0).unwrap();
        assert_eq!(buffer.index_of(key_c), Some(1));

        buffer.replace_by_key(key_c, ImportRecord::named("C2")).unwrap();
        assert_eq!(names(&buffer), vec!["B", "C2"]);

        buffer.remove_by_key(key_c).unwrap();
        assert_eq!(buffer.remove_by_key(key_c), Err(StagingError::UnknownKey(key_c)));
        assert_eq!(names(&buffer), vec!["B"]);
    }

    #[test]
    fn test_empty_and_clear() {
        let empty = StagingBuffer::from_records(None, Vec::new());
        assert!(empty.is_empty());

        let mut buffer = abc();
        buffer.clear();
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.source_job().map(JobId::as_str), Some("job-1"));
    }
}

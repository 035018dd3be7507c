use std::collections::BTreeSet;

use nightqa_core::ExposureId;

/// Exposures already handled by this process.
///
/// Owned by the polling loop, which is its only writer; discovery only
/// reads it. An exposure is inserted after its outputs are persisted, or
/// after it fails, so a failing exposure is not retried until restart.
#[derive(Debug, Default, Clone)]
pub struct ProcessedSet {
    seen: BTreeSet<ExposureId>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `id` was already present.
    pub fn insert(&mut self, id: ExposureId) -> bool {
        self.seen.insert(id)
    }

    pub fn contains(&self, id: ExposureId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ExposureId> + '_ {
        self.seen.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent() {
        let mut set = ProcessedSet::new();
        let id = ExposureId::new(20220101, 1);
        assert!(set.insert(id));
        assert!(!set.insert(id));
        assert!(set.contains(id));
        assert_eq!(set.len(), 1);
    }
}

use std::sync::Arc;

use crate::types::Record;

/// Iterator over a region as it was when the scan started.
///
/// Holds shared references to the records, not the region lock, so
/// writers are never blocked by a slow consumer.
pub struct RegionScan {
    inner: std::vec::IntoIter<Arc<Record>>,
}

impl RegionScan {
    pub(crate) fn new(snapshot: Vec<Arc<Record>>) -> Self {
        Self {
            inner: snapshot.into_iter(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Iterator for RegionScan {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| Record::clone(&record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RegionScan {}

use std::collections::{HashSet, VecDeque};

/// Counts produced by one [`UploadQueue::reconcile`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Round-robin queue of absolute local paths waiting for upload.
///
/// A path appears at most once. Failed work goes back to the tail, so every
/// other pending file gets a turn before it is retried.
#[derive(Debug, Default)]
pub struct UploadQueue {
    inner: VecDeque<String>,
}

impl UploadQueue {
    /// Folds a fresh directory scan into the queue.
    ///
    /// Entries missing from `scanned` are dropped, unseen paths are appended
    /// in scan order, and surviving entries keep their position. `in_flight`
    /// is never added; it is not in the queue, so it cannot be removed either.
    pub fn reconcile(&mut self, scanned: &[String], in_flight: Option<&str>) -> ReconcileReport {
        let present: HashSet<&str> = scanned.iter().map(String::as_str).collect();
        let before = self.inner.len();
        self.inner.retain(|path| {
            let keep = present.contains(path.as_str());
            if !keep {
                tracing::info!(path = %path, "file vanished locally, dropped from queue");
            }
            keep
        });
        let removed = before - self.inner.len();

        let mut known: HashSet<String> = self.inner.iter().cloned().collect();
        let mut added = 0;
        for path in scanned {
            if in_flight == Some(path.as_str()) || known.contains(path) {
                continue;
            }
            tracing::info!(path = %path, "queued new file");
            known.insert(path.clone());
            self.inner.push_back(path.clone());
            added += 1;
        }

        ReconcileReport { added, removed }
    }

    pub fn dequeue(&mut self) -> Option<String> {
        self.inner.pop_front()
    }

    /// Appends `path` at the tail. Returns `false` if it was already queued.
    pub fn requeue(&mut self, path: String) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.inner.push_back(path);
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.inner.iter().any(|queued| queued == path)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.inner.iter().cloned().collect()
    }
}

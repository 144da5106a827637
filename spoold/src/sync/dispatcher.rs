use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use reqwest::Body;
use spool_core::{PutOutcome, StoreClient, StoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;

use super::conflict::{ConflictOutcome, resolve_conflict};
use super::paths::remote_name_for;
use super::queue::{ReconcileReport, UploadQueue};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("remote store rejected credentials while uploading {path}: {source}")]
    Unrecoverable {
        path: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DispatchState {
    #[default]
    Idle,
    Uploading(String),
}

impl DispatchState {
    pub fn in_flight(&self) -> Option<&str> {
        match self {
            DispatchState::Idle => None,
            DispatchState::Uploading(path) => Some(path.as_str()),
        }
    }
}

/// What one [`Dispatcher::advance`] step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing queued.
    Idle,
    /// Another step is already uploading.
    Busy,
    Uploaded { path: String },
    /// The name was taken by identical content.
    Deduplicated { path: String },
    Requeued { path: String, reason: String },
}

/// Marks the moment a directory listing started. Uploads finished after it
/// may still appear in that listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket(u64);

/// Queue plus in-flight marker. Both lanes mutate it, always under the same
/// lock and never across an await point.
#[derive(Debug, Default)]
pub struct SpoolState {
    queue: UploadQueue,
    dispatch: DispatchState,
    completed: u64,
    recently_done: VecDeque<(u64, String)>,
}

impl SpoolState {
    pub fn ticket(&self) -> ScanTicket {
        ScanTicket(self.completed)
    }

    /// Reconciles a listing taken just now.
    pub fn reconcile(&mut self, scanned: &[String]) -> ReconcileReport {
        let ticket = self.ticket();
        self.reconcile_scan(scanned, ticket)
    }

    /// Reconciles a listing taken at `ticket`. Paths uploaded and deleted
    /// since then are not queued again.
    pub fn reconcile_scan(&mut self, scanned: &[String], ticket: ScanTicket) -> ReconcileReport {
        let ScanTicket(seen) = ticket;
        let stale: Vec<&str> = self
            .recently_done
            .iter()
            .filter(|(seq, _)| *seq > seen)
            .map(|(_, path)| path.as_str())
            .collect();
        let report = if stale.is_empty() {
            self.queue.reconcile(scanned, self.dispatch.in_flight())
        } else {
            let fresh: Vec<String> = scanned
                .iter()
                .filter(|path| {
                    let done = stale.contains(&path.as_str());
                    if done {
                        tracing::debug!(path = %path, "ignoring stale listing of uploaded file");
                    }
                    !done
                })
                .cloned()
                .collect();
            self.queue.reconcile(&fresh, self.dispatch.in_flight())
        };
        self.recently_done.retain(|(seq, _)| *seq > seen);
        report
    }

    /// `Idle` with work queued moves to `Uploading(head)`.
    fn begin_next(&mut self) -> NextStep {
        if self.dispatch != DispatchState::Idle {
            return NextStep::Busy;
        }
        match self.queue.dequeue() {
            Some(path) => {
                self.dispatch = DispatchState::Uploading(path.clone());
                NextStep::Start(path)
            }
            None => NextStep::Empty,
        }
    }

    fn finish(&mut self, requeue: bool) {
        let DispatchState::Uploading(path) = std::mem::take(&mut self.dispatch) else {
            return;
        };
        if requeue {
            self.queue.requeue(path);
        } else {
            self.completed += 1;
            self.recently_done.push_back((self.completed, path));
        }
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn dispatch(&self) -> &DispatchState {
        &self.dispatch
    }
}

enum NextStep {
    Busy,
    Empty,
    Start(String),
}

enum Attempt {
    Stored,
    Duplicate,
    Failed(String),
    Fatal(StoreError),
}

/// Single-slot upload driver. Exactly one attempt runs at a time; every
/// attempt ends by deleting the local file or sending its path to the tail.
pub struct Dispatcher {
    client: StoreClient,
    remote_prefix: String,
    state: Mutex<SpoolState>,
}

impl Dispatcher {
    pub fn new(client: StoreClient, remote_prefix: impl Into<String>) -> Self {
        Self {
            client,
            remote_prefix: remote_prefix.into(),
            state: Mutex::new(SpoolState::default()),
        }
    }

    pub async fn reconcile(&self, scanned: &[String]) -> ReconcileReport {
        self.state.lock().await.reconcile(scanned)
    }

    /// Take before listing the directory, hand to [`Dispatcher::reconcile_scan`].
    pub async fn scan_ticket(&self) -> ScanTicket {
        self.state.lock().await.ticket()
    }

    pub async fn reconcile_scan(&self, scanned: &[String], ticket: ScanTicket) -> ReconcileReport {
        self.state.lock().await.reconcile_scan(scanned, ticket)
    }

    pub async fn queued(&self) -> Vec<String> {
        self.state.lock().await.queue().snapshot()
    }

    pub async fn dispatch_state(&self) -> DispatchState {
        self.state.lock().await.dispatch().clone()
    }

    /// Runs one dispatch step to its terminal outcome.
    pub async fn advance(&self) -> Result<DispatchOutcome, DispatchError> {
        let path = match self.state.lock().await.begin_next() {
            NextStep::Start(path) => path,
            NextStep::Empty => return Ok(DispatchOutcome::Idle),
            NextStep::Busy => return Ok(DispatchOutcome::Busy),
        };
        tracing::info!(path = %path, "upload start");

        match self.attempt(&path).await {
            Attempt::Stored => {
                self.remove_local(&path).await;
                self.state.lock().await.finish(false);
                tracing::info!(path = %path, "upload done");
                Ok(DispatchOutcome::Uploaded { path })
            }
            Attempt::Duplicate => {
                self.remove_local(&path).await;
                self.state.lock().await.finish(false);
                tracing::info!(path = %path, "remote already holds identical content");
                Ok(DispatchOutcome::Deduplicated { path })
            }
            Attempt::Failed(reason) => {
                self.state.lock().await.finish(true);
                tracing::warn!(path = %path, reason = %reason, "upload failed, requeued at tail");
                Ok(DispatchOutcome::Requeued { path, reason })
            }
            Attempt::Fatal(source) => {
                self.state.lock().await.finish(true);
                Err(DispatchError::Unrecoverable { path, source })
            }
        }
    }

    /// Dispatch lane: advance, cool down, repeat. Returns only on a fatal
    /// remote error.
    pub async fn run(&self, cooldown: Duration) -> Result<(), DispatchError> {
        loop {
            self.advance().await?;
            tokio::time::sleep(cooldown).await;
        }
    }

    async fn attempt(&self, path: &str) -> Attempt {
        let local = Path::new(path);
        let remote = match remote_name_for(&self.remote_prefix, local) {
            Ok(remote) => remote,
            Err(err) => return Attempt::Failed(err.to_string()),
        };
        let file = match tokio::fs::File::open(local).await {
            Ok(file) => file,
            Err(err) => return Attempt::Failed(format!("failed to open local file: {err}")),
        };
        let body = Body::wrap_stream(ReaderStream::new(file));

        match self.client.put(&remote, body, true).await {
            Ok(PutOutcome::Created) => Attempt::Stored,
            Ok(PutOutcome::AlreadyExists) => {
                tracing::info!(path, remote = %remote, "remote name taken, comparing checksums");
                match resolve_conflict(&self.client, &remote, local).await {
                    ConflictOutcome::Match => Attempt::Duplicate,
                    ConflictOutcome::Mismatch => {
                        Attempt::Failed(format!("a different object already exists at {remote}"))
                    }
                }
            }
            Err(err) if err.is_fatal() => Attempt::Fatal(err),
            Err(err) => Attempt::Failed(err.to_string()),
        }
    }

    /// The object is already stored; a leftover local copy only costs a
    /// conflict check on the next rotation.
    async fn remove_local(&self, path: &str) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            tracing::warn!(path, error = %err, "failed to delete uploaded file");
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

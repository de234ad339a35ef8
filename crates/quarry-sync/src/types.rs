use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use quarry_manifest::ManifestEntry;
use quarry_types::{Digest, ErrorClass};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Default worker pool size.
pub const DEFAULT_JOBS: usize = 4;

/// Knobs shared by every batch operation.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// Maximum entries in flight at once.
    pub jobs: usize,
    /// Once cancelled, no further entries start.
    pub cancel: CancellationToken,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            jobs: DEFAULT_JOBS,
            cancel: CancellationToken::new(),
        }
    }
}

impl TransferOptions {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Per-entry result of a batch operation.
pub trait Outcome: Clone + Send + 'static {
    /// Every label [`Outcome::label`] can return, in display order.
    const LABELS: &'static [&'static str];

    fn label(&self) -> &'static str;

    fn failure(&self) -> Option<&SyncError>;

    /// Bytes moved for this entry.
    fn bytes(&self) -> u64 {
        0
    }

    /// Wrap an error as this outcome's failure case.
    fn failed(error: SyncError) -> Self;
}

/// Result of pushing one entry.
#[derive(Clone, Debug)]
pub enum PushOutcome {
    Uploaded { bytes: u64 },
    AlreadyPresent,
    Failed(Arc<SyncError>),
}

impl Outcome for PushOutcome {
    const LABELS: &'static [&'static str] = &["uploaded", "already present", "failed"];

    fn label(&self) -> &'static str {
        match self {
            Self::Uploaded { .. } => "uploaded",
            Self::AlreadyPresent => "already present",
            Self::Failed(_) => "failed",
        }
    }

    fn failure(&self) -> Option<&SyncError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn bytes(&self) -> u64 {
        match self {
            Self::Uploaded { bytes } => *bytes,
            _ => 0,
        }
    }

    fn failed(error: SyncError) -> Self {
        Self::Failed(Arc::new(error))
    }
}

/// Result of pulling one entry.
#[derive(Clone, Debug)]
pub enum PullOutcome {
    Downloaded { bytes: u64 },
    /// The blob was already cached.
    Unchanged,
    Failed(Arc<SyncError>),
}

impl Outcome for PullOutcome {
    const LABELS: &'static [&'static str] = &["downloaded", "unchanged", "failed"];

    fn label(&self) -> &'static str {
        match self {
            Self::Downloaded { .. } => "downloaded",
            Self::Unchanged => "unchanged",
            Self::Failed(_) => "failed",
        }
    }

    fn failure(&self) -> Option<&SyncError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn bytes(&self) -> u64 {
        match self {
            Self::Downloaded { bytes } => *bytes,
            _ => 0,
        }
    }

    fn failed(error: SyncError) -> Self {
        Self::Failed(Arc::new(error))
    }
}

/// Result of checking out one entry.
#[derive(Clone, Debug)]
pub enum CheckoutOutcome {
    /// The working file was written. `pulled` is set if the blob had to be
    /// fetched from the remote first.
    Restored { bytes: u64, pulled: bool },
    /// The working file already matched; nothing was written.
    AlreadyUpToDate,
    Failed(Arc<SyncError>),
}

impl Outcome for CheckoutOutcome {
    const LABELS: &'static [&'static str] = &["restored", "up to date", "failed"];

    fn label(&self) -> &'static str {
        match self {
            Self::Restored { .. } => "restored",
            Self::AlreadyUpToDate => "up to date",
            Self::Failed(_) => "failed",
        }
    }

    fn failure(&self) -> Option<&SyncError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn bytes(&self) -> u64 {
        match self {
            Self::Restored { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    fn failed(error: SyncError) -> Self {
        Self::Failed(Arc::new(error))
    }
}

/// One entry of a batch and what happened to it.
#[derive(Clone, Debug)]
pub struct EntryOutcome<O> {
    pub entry: ManifestEntry,
    pub outcome: O,
}

/// A pointer file that could not be read, so it never became an entry.
#[derive(Clone, Debug)]
pub struct UnreadablePointer {
    pub pointer: PathBuf,
    pub error: Arc<SyncError>,
}

impl UnreadablePointer {
    pub fn new(pointer: impl Into<PathBuf>, error: impl Into<SyncError>) -> Self {
        Self {
            pointer: pointer.into(),
            error: Arc::new(error.into()),
        }
    }
}

/// Per-entry outcomes of a batch, in input order.
#[derive(Clone, Debug)]
pub struct TransferReport<O> {
    pub entries: Vec<EntryOutcome<O>>,
    /// Pointer files skipped because they could not be read. Each counts as
    /// a failed entry.
    pub unreadable: Vec<UnreadablePointer>,
}

pub type PushReport = TransferReport<PushOutcome>;
pub type PullReport = TransferReport<PullOutcome>;
pub type CheckoutReport = TransferReport<CheckoutOutcome>;

impl<O> Default for TransferReport<O> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            unreadable: Vec::new(),
        }
    }
}

impl<O> From<Vec<EntryOutcome<O>>> for TransferReport<O> {
    fn from(entries: Vec<EntryOutcome<O>>) -> Self {
        Self {
            entries,
            unreadable: Vec::new(),
        }
    }
}

impl<O: Outcome> TransferReport<O> {
    /// Attach pointer files that were skipped before the batch ran.
    pub fn with_unreadable(mut self, unreadable: Vec<UnreadablePointer>) -> Self {
        self.unreadable.extend(unreadable);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries reporting `label`.
    pub fn count(&self, label: &str) -> usize {
        self.entries.iter().filter(|e| e.outcome.label() == label).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.failure().is_some()).count() + self.unreadable.len()
    }

    pub fn succeeded(&self) -> usize {
        self.len() - self.failed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ManifestEntry, &SyncError)> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.failure().map(|err| (&e.entry, err)))
    }

    /// The most severe failure class in the batch, if any entry failed.
    pub fn worst_class(&self) -> Option<ErrorClass> {
        self.failures()
            .map(|(_, e)| e.class())
            .chain(self.unreadable.iter().map(|u| u.error.class()))
            .min()
    }

    /// Bytes moved, counting each digest once.
    pub fn bytes_transferred(&self) -> u64 {
        let mut seen: HashSet<&Digest> = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(&e.entry.digest))
            .map(|e| e.outcome.bytes())
            .sum()
    }

    /// One-line summary, e.g. `2 uploaded, 1 already present, 0 failed`.
    /// Unreadable pointers are listed last, and only when there are any.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = O::LABELS
            .iter()
            .map(|label| format!("{} {label}", self.count(label)))
            .collect();
        if !self.unreadable.is_empty() {
            parts.push(format!("{} unreadable", self.unreadable.len()));
        }
        parts.join(", ")
    }
}

//! Synchronization engine for Quarry.
//!
//! Reconciles three places a blob can live: the working copy, the local cache,
//! and a remote store. [`SyncEngine::push`] uploads cached blobs the remote
//! lacks, [`SyncEngine::pull`] fills the cache from the remote, and
//! [`SyncEngine::checkout`] materializes working files, pulling on a miss.
//!
//! Every batch runs on a bounded worker pool and returns a per-entry
//! [`TransferReport`]; one failing entry never aborts the rest. All writes go
//! through a temporary file and a rename, so a crash or cancellation never
//! leaves a partial blob or working file behind.

pub mod checkout;
pub mod engine;
pub mod error;
mod pool;
pub mod types;

pub use checkout::materialize;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use types::{
    CheckoutOutcome, CheckoutReport, EntryOutcome, Outcome, PullOutcome, PullReport, PushOutcome,
    PushReport, TransferOptions, TransferReport, UnreadablePointer, DEFAULT_JOBS,
};

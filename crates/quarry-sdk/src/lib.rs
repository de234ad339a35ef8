//! High-level SDK for Quarry.
//!
//! [`Repository`] ties the lower crates together: it owns the `.quarry/`
//! layout (config and blob cache), turns user paths into pointer records, and
//! builds a sync engine against the configured remote. This is the main entry
//! point for applications embedding Quarry and for the `quarry` binary.

pub mod config;
pub mod error;
pub mod repository;

pub use config::{CoreConfig, RemoteConfig, RepoConfig, TransferConfig, DEFAULT_REMOTE_NAME};
pub use error::{SdkError, SdkResult};
pub use repository::{Repository, QUARRY_DIR};

// Re-export key types
pub use quarry_cache::GcReport;
pub use quarry_manifest::{EntryStatus, ManifestEntry, StatusReport, Tracked};
pub use quarry_sync::{
    CheckoutOutcome, CheckoutReport, Outcome, PullOutcome, PullReport, PushOutcome, PushReport,
    TransferOptions, TransferReport,
};
pub use quarry_types::{Digest, ErrorClass, HashAlgorithm};

//! Pointer manifests for Quarry.
//!
//! A tracked artifact is represented in the primary VCS by a small pointer
//! file next to it (`<artifact>.qp`) recording the algorithm, digest, size,
//! and path of the content. This crate owns that record: building it from a
//! working file ([`Tracker`]), encoding and decoding it ([`pointer`]), and
//! comparing it against the working copy ([`status`]).
//!
//! # Key Types
//!
//! - [`ManifestEntry`] -- One tracked path and the blob it points at
//! - [`Tracker`] -- Hashes a working file into the cache and writes its pointer
//! - [`EntryStatus`] -- Unchanged / Modified / Missing
//! - [`StatusReport`] -- Status of a batch of entries

pub mod entry;
pub mod error;
pub mod pointer;
pub mod status;
pub mod track;

pub use entry::{normalize_tracked_path, ManifestEntry};
pub use error::{ManifestError, ManifestResult};
pub use pointer::{
    discover_pointers, load_pointer, parse, pointer_path_for, read_pointer, remove_pointer, serialize,
    write_pointer, POINTER_EXTENSION,
};
pub use status::{status, EntryStatus, StatusReport};
pub use track::{Tracked, Tracker};

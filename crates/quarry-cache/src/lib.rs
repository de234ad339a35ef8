//! Local content-addressed blob cache for Quarry.
//!
//! Every tracked version of every artifact lives here as an immutable blob
//! keyed by its [`Digest`](quarry_types::Digest). The cache never talks to the
//! network; filling it from a remote is the sync engine's job.
//!
//! # Backends
//!
//! All backends implement the [`BlobCache`] trait:
//!
//! - [`DiskCache`] -- sharded directory tree, `<root>/<algo>/<aa>/<bb>/<hex>`
//! - [`InMemoryCache`] -- `HashMap`-based cache for tests and embedding
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written (content addressing guarantees this).
//! 2. Write-then-rename: a blob is staged under `tmp/` and only becomes
//!    visible under its final name once complete.
//! 3. Writing a digest that already exists is a no-op.
//! 4. Blobs are only removed by an explicit [`collect_garbage`] pass.

pub mod disk;
pub mod error;
pub mod gc;
pub mod memory;
pub mod traits;

pub use disk::DiskCache;
pub use error::{CacheError, CacheResult};
pub use gc::{collect_garbage, sweep_staging, GcReport, STALE_STAGING_AGE};
pub use memory::InMemoryCache;
pub use traits::{BlobCache, CachePut};

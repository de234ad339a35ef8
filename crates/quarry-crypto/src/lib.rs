//! Content hashing for Quarry.
//!
//! Provides incremental hashing over byte streams for every supported
//! [`HashAlgorithm`](quarry_types::HashAlgorithm), plus reader and writer
//! adapters that hash bytes as they are copied so a blob can be stored (or
//! restored) and verified in a single pass.
//!
//! Hashing wraps the established RustCrypto and BLAKE3 implementations.

pub mod hasher;
pub mod reader;
pub mod writer;

pub use hasher::{ContentHasher, READ_BUFFER_SIZE};
pub use reader::HashingReader;
pub use writer::HashingWriter;

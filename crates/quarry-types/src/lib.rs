//! Foundation types for Quarry.
//!
//! This crate provides the identifiers and classifications shared by every
//! other Quarry crate.
//!
//! # Key Types
//!
//! - [`Digest`] -- Content-addressed identifier (algorithm + hash bytes)
//! - [`HashAlgorithm`] -- Which hash function produced a digest
//! - [`ErrorClass`] -- User-facing failure taxonomy and exit codes

pub mod algorithm;
pub mod class;
pub mod digest;
pub mod error;

pub use algorithm::HashAlgorithm;
pub use class::ErrorClass;
pub use digest::Digest;
pub use error::TypeError;

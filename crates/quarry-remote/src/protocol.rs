//! HTTP object-store protocol shared by [`HttpRemote`](crate::HttpRemote) and
//! the server.

use quarry_types::{Digest, HashAlgorithm};
use serde::{Deserialize, Serialize};

/// Protocol revision, reported by the health endpoint.
pub const PROTOCOL_VERSION: u32 = 1;

/// HTTP endpoint paths.
pub mod endpoints {
    pub const HEALTH: &str = "/v1/health";
    pub const OBJECTS: &str = "/v1/objects";
}

/// Path of one object: `/v1/objects/<algorithm>/<hex>`.
pub fn object_path(digest: &Digest) -> String {
    format!("{}/{}", endpoints::OBJECTS, digest.blob_ref())
}

/// Path of the listing for one algorithm: `/v1/objects/<algorithm>`.
pub fn listing_path(algorithm: HashAlgorithm) -> String {
    format!("{}/{}", endpoints::OBJECTS, algorithm)
}

/// Health check response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Listing response: hex digests of one algorithm, sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectList {
    pub algorithm: String,
    pub digests: Vec<String>,
}

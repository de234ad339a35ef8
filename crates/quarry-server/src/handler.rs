use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use quarry_remote::protocol::{HealthResponse, ObjectList};
use quarry_remote::{LocalMirror, PutOutcome, RemoteStore};
use quarry_types::{Digest, HashAlgorithm};
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::BearerAuth;
use crate::error::{ServerError, ServerResult};

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: LocalMirror,
    pub auth: BearerAuth,
}

fn parse_algorithm(name: &str) -> ServerResult<HashAlgorithm> {
    name.parse()
        .map_err(|_| ServerError::InvalidKey(format!("unknown algorithm {name:?}")))
}

fn parse_key(algorithm: &str, hex: &str) -> ServerResult<Digest> {
    let algorithm = parse_algorithm(algorithm)?;
    Digest::from_hex(algorithm, hex).map_err(|e| ServerError::InvalidKey(e.to_string()))
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

pub async fn head_object(
    State(state): State<AppState>,
    Path((algorithm, hex)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let digest = parse_key(&algorithm, &hex)?;
    if state.store.exists(&digest).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

pub async fn get_object(
    State(state): State<AppState>,
    Path((algorithm, hex)): Path<(String, String)>,
) -> ServerResult<Response> {
    let digest = parse_key(&algorithm, &hex)?;
    match state.store.get(&digest).await? {
        Some(content) => {
            debug!(digest = %digest.short_hex(), size = content.len(), "serving object");
            Ok(([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// Store an object. The store verifies the content against the key before
/// finalizing it; a mismatch is answered with 422.
pub async fn put_object(
    State(state): State<AppState>,
    Path((algorithm, hex)): Path<(String, String)>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let digest = parse_key(&algorithm, &hex)?;
    if digest.algorithm().is_legacy() {
        return Err(ServerError::InvalidKey(format!(
            "{} objects are read-only",
            digest.algorithm()
        )));
    }
    let size = body.len();
    match state.store.put(&digest, body).await? {
        PutOutcome::Stored => {
            info!(digest = %digest.short_hex(), size, "object stored");
            Ok(StatusCode::CREATED)
        }
        PutOutcome::AlreadyPresent => Ok(StatusCode::OK),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: String,
}

pub async fn list_objects(
    State(state): State<AppState>,
    Path(algorithm): Path<String>,
    Query(query): Query<ListQuery>,
) -> ServerResult<Json<ObjectList>> {
    let algorithm = parse_algorithm(&algorithm)?;
    let digests = state.store.list(algorithm, &query.prefix).await?;
    Ok(Json(ObjectList {
        algorithm: algorithm.to_string(),
        digests: digests.iter().map(Digest::to_hex).collect(),
    }))
}

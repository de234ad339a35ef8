//! HTTP object-store client.
//!
//! Talks to `quarry-server` (or anything implementing the same protocol, see
//! [`protocol`](crate::protocol)). The server stages uploads and finalizes them
//! atomically, so a dropped connection never leaves a partial object behind.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use quarry_types::{Digest, HashAlgorithm};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::auth::Credentials;
use crate::error::{RemoteError, RemoteResult};
use crate::protocol::{listing_path, object_path, ObjectList};
use crate::traits::{is_valid_prefix, PutOutcome, RemoteStore};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Remote store reached over HTTP.
#[derive(Clone, Debug)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpRemote {
    /// Build a client for the server at `base_url` (`http://` or `https://`).
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> RemoteResult<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::from_reqwest(base_url, e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(&self.base_url, e))?;
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized {
                backend: self.base_url.clone(),
            });
        }
        Ok(response)
    }

    async fn upload(&self, digest: &Digest, request: RequestBuilder, size: u64) -> RemoteResult<PutOutcome> {
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::CREATED => {
                debug!(digest = %digest.short_hex(), size, remote = %self.base_url, "object uploaded");
                Ok(PutOutcome::Stored)
            }
            StatusCode::OK => Ok(PutOutcome::AlreadyPresent),
            StatusCode::UNPROCESSABLE_ENTITY => Err(RemoteError::Rejected {
                backend: self.base_url.clone(),
                reason: response.text().await.unwrap_or_default(),
            }),
            _ => Err(self.unexpected(response).await),
        }
    }

    async fn unexpected(&self, response: Response) -> RemoteError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        RemoteError::Status {
            backend: self.base_url.clone(),
            status,
            message,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn put(&self, digest: &Digest, content: Bytes) -> RemoteResult<PutOutcome> {
        let size = content.len() as u64;
        let request = self.client.put(self.url(&object_path(digest))).body(content);
        self.upload(digest, request, size).await
    }

    async fn get(&self, digest: &Digest) -> RemoteResult<Option<Bytes>> {
        let request = self.client.get(self.url(&object_path(digest)));
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| RemoteError::from_reqwest(&self.base_url, e))?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(self.unexpected(response).await),
        }
    }

    async fn exists(&self, digest: &Digest) -> RemoteResult<bool> {
        let request = self.client.head(self.url(&object_path(digest)));
        let response = self.send(request).await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.unexpected(response).await),
        }
    }

    async fn list(&self, algorithm: HashAlgorithm, hex_prefix: &str) -> RemoteResult<Vec<Digest>> {
        if !is_valid_prefix(algorithm, hex_prefix) {
            return Err(RemoteError::InvalidPrefix(hex_prefix.to_string()));
        }
        let request = self
            .client
            .get(self.url(&listing_path(algorithm)))
            .query(&[("prefix", hex_prefix)]);
        let response = self.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(self.unexpected(response).await);
        }
        let listing: ObjectList = response
            .json()
            .await
            .map_err(|e| RemoteError::from_reqwest(&self.base_url, e))?;

        let mut digests = listing
            .digests
            .iter()
            .map(|hex| {
                Digest::from_hex(algorithm, hex).map_err(|e| RemoteError::Protocol {
                    backend: self.base_url.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<RemoteResult<Vec<_>>>()?;
        digests.sort();
        Ok(digests)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }

    async fn put_file(&self, digest: &Digest, source: &Path) -> RemoteResult<PutOutcome> {
        let file = tokio::fs::File::open(source)
            .await
            .map_err(|e| RemoteError::io(source, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| RemoteError::io(source, e))?
            .len();
        let request = self
            .client
            .put(self.url(&object_path(digest)))
            .header(CONTENT_LENGTH, size)
            .body(Body::from(file));
        self.upload(digest, request, size).await
    }

    async fn get_to_file(&self, digest: &Digest, target: &Path) -> RemoteResult<Option<u64>> {
        let request = self.client.get(self.url(&object_path(digest)));
        let mut response = self.send(request).await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(None),
            _ => return Err(self.unexpected(response).await),
        }

        let mut out = tokio::fs::File::create(target)
            .await
            .map_err(|e| RemoteError::io(target, e))?;
        let mut size = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RemoteError::from_reqwest(&self.base_url, e))?
        {
            out.write_all(&chunk).await.map_err(|e| RemoteError::io(target, e))?;
            size += chunk.len() as u64;
        }
        out.flush().await.map_err(|e| RemoteError::io(target, e))?;
        Ok(Some(size))
    }
}

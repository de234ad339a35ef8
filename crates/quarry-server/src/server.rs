use std::future::Future;

use quarry_remote::LocalMirror;
use tokio::net::TcpListener;

use crate::auth::BearerAuth;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Quarry object-store server.
pub struct QuarryServer {
    config: ServerConfig,
}

impl QuarryServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            store: LocalMirror::new(self.config.root.clone()),
            auth: BearerAuth::new(self.config.auth_token.clone()),
        };
        build_router(state, self.config.max_object_size)
    }

    /// Serve until the process exits.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` completes, then finish in-flight requests.
    pub async fn serve_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        std::fs::create_dir_all(&self.config.root)?;
        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            root = %self.config.root.display(),
            auth = self.config.auth_token.is_some(),
            "quarry server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use quarry_crypto::ContentHasher;
    use quarry_remote::{Credentials, HttpRemote, PutOutcome, RemoteError, RemoteStore};
    use quarry_types::HashAlgorithm;

    async fn spawn(config: ServerConfig) -> SocketAddr {
        let app = QuarryServer::new(config).router();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr, credentials: Credentials) -> Arc<dyn RemoteStore> {
        let url = format!("http://{addr}");
        Arc::new(HttpRemote::new(&url, credentials, Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn server_construction() {
        let server = QuarryServer::new(ServerConfig::default());
        assert_eq!(
            server.config().bind_addr,
            crate::DEFAULT_BIND.parse::<SocketAddr>().unwrap()
        );
        let _router = server.router();
    }

    #[tokio::test]
    async fn http_remote_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn(ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        })
        .await;
        let remote = client(addr, Credentials::Anonymous);

        let content = Bytes::from(vec![42u8; 300_000]);
        let digest = ContentHasher::hash(HashAlgorithm::Blake3, &content);
        assert!(!remote.exists(&digest).await.unwrap());
        assert!(remote.get(&digest).await.unwrap().is_none());

        assert_eq!(remote.put(&digest, content.clone()).await.unwrap(), PutOutcome::Stored);
        assert_eq!(
            remote.put(&digest, content.clone()).await.unwrap(),
            PutOutcome::AlreadyPresent
        );
        assert!(remote.exists(&digest).await.unwrap());
        assert_eq!(remote.get(&digest).await.unwrap().unwrap(), content);

        let listed = remote.list(HashAlgorithm::Blake3, &digest.to_hex()[..3]).await.unwrap();
        assert_eq!(listed, vec![digest.clone()]);

        // The objects land in the same layout a filesystem mirror uses.
        assert!(dir.path().join(digest.shard_path()).is_file());
    }

    #[tokio::test]
    async fn files_stream_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn(ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        })
        .await;
        let remote = client(addr, Credentials::Anonymous);
        let work = tempfile::tempdir().unwrap();

        let data = vec![9u8; 500_000];
        let digest = ContentHasher::hash(HashAlgorithm::Blake3, &data);
        let source = work.path().join("upload.bin");
        std::fs::write(&source, &data).unwrap();
        assert_eq!(remote.put_file(&digest, &source).await.unwrap(), PutOutcome::Stored);

        let target = work.path().join("download.bin");
        assert_eq!(remote.get_to_file(&digest, &target).await.unwrap(), Some(500_000));
        assert_eq!(std::fs::read(&target).unwrap(), data);

        let absent = ContentHasher::hash(HashAlgorithm::Blake3, b"absent");
        assert_eq!(remote.get_to_file(&absent, &work.path().join("none.bin")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn mismatched_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn(ServerConfig {
            root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        })
        .await;
        let remote = client(addr, Credentials::Anonymous);

        let digest = ContentHasher::hash(HashAlgorithm::Sha256, b"expected");
        let err = remote.put(&digest, Bytes::from_static(b"tampered")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { .. }), "{err}");
        assert!(!remote.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn token_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn(ServerConfig {
            root: dir.path().to_path_buf(),
            auth_token: Some("s3cret".into()),
            ..ServerConfig::default()
        })
        .await;
        let digest = ContentHasher::hash(HashAlgorithm::Blake3, b"guarded");

        let anonymous = client(addr, Credentials::Anonymous);
        let err = anonymous.exists(&digest).await.unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized { .. }));
        assert!(!err.is_transient());

        let authorized = client(addr, Credentials::Bearer("s3cret".into()));
        assert!(!authorized.exists(&digest).await.unwrap());
    }
}

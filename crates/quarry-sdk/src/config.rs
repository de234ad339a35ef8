//! Repository configuration (`.quarry/config.toml`).

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use quarry_remote::{Credentials, RetryPolicy, DEFAULT_TOKEN_ENV};
use quarry_sync::DEFAULT_JOBS;
use quarry_types::HashAlgorithm;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{SdkError, SdkResult};

/// Name given to a remote when the user does not pick one.
pub const DEFAULT_REMOTE_NAME: &str = "origin";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    pub core: CoreConfig,
    pub transfer: TransferConfig,
    pub remotes: BTreeMap<String, RemoteConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Remote used when a command does not name one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Algorithm for newly tracked content.
    pub algorithm: HashAlgorithm,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    pub jobs: usize,
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            jobs: DEFAULT_JOBS,
            retries: retry.max_retries,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            timeout_secs: quarry_remote::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named remote. Credentials are never stored here: `token_env` names the
/// environment variable read when the remote is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token_env: None,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::from_env(self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV))
    }
}

impl RepoConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SdkError::io(path, e))?;
        let config: Self = toml::from_str(&text).map_err(|e| SdkError::config(path, e.message()))?;
        config.validate(path)?;
        Ok(config)
    }

    /// Validate, then write atomically (temp file in the same directory and
    /// rename).
    pub fn save(&self, path: &Path) -> SdkResult<()> {
        self.validate(path)?;
        let text = toml::to_string_pretty(self).map_err(|e| SdkError::config(path, e.to_string()))?;
        let dir = path
            .parent()
            .ok_or_else(|| SdkError::config(path, "config path has no parent directory"))?;
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| SdkError::io(dir, e))?;
        staged
            .write_all(text.as_bytes())
            .map_err(|e| SdkError::io(staged.path(), e))?;
        staged
            .persist(path)
            .map_err(|e| SdkError::io(path, e.error))?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> SdkResult<()> {
        if self.transfer.jobs == 0 {
            return Err(SdkError::config(path, "transfer.jobs must be at least 1"));
        }
        if self.core.algorithm.is_legacy() {
            return Err(SdkError::config(
                path,
                format!("core.algorithm {} is a legacy algorithm", self.core.algorithm),
            ));
        }
        if self.transfer.base_delay_ms > self.transfer.max_delay_ms {
            return Err(SdkError::config(
                path,
                "transfer.base_delay_ms exceeds transfer.max_delay_ms",
            ));
        }
        if let Some(name) = &self.core.remote {
            if !self.remotes.contains_key(name) {
                return Err(SdkError::config(
                    path,
                    format!("core.remote names unknown remote {name:?}"),
                ));
            }
        }
        for (name, remote) in &self.remotes {
            if name.is_empty() || remote.url.trim().is_empty() {
                return Err(SdkError::config(path, format!("remote {name:?} has no url")));
            }
        }
        Ok(())
    }

    /// Pick the remote to use: `name` if given, otherwise `core.remote`,
    /// otherwise the only configured remote.
    pub fn resolve_remote(&self, name: Option<&str>) -> SdkResult<(&str, &RemoteConfig)> {
        let name = match name.or(self.core.remote.as_deref()) {
            Some(name) => name,
            None => match self.remotes.keys().next() {
                Some(only) if self.remotes.len() == 1 => only.as_str(),
                _ => return Err(SdkError::NoRemote),
            },
        };
        self.remotes
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| SdkError::UnknownRemote(name.to_string()))
    }

    /// Add or replace a remote. The first remote becomes the default.
    pub fn set_remote(&mut self, name: &str, remote: RemoteConfig) {
        self.remotes.insert(name.to_string(), remote);
        if self.core.remote.is_none() {
            self.core.remote = Some(name.to_string());
        }
    }

    /// Remove a remote, clearing the default if it pointed there.
    pub fn remove_remote(&mut self, name: &str) -> bool {
        let removed = self.remotes.remove(name).is_some();
        if self.core.remote.as_deref() == Some(name) {
            self.core.remote = None;
        }
        removed
    }
}

pub(crate) fn is_not_found(e: &SdkError) -> bool {
    matches!(e, SdkError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Hash function used to address a blob.
///
/// The algorithm travels with every digest and every pointer record; nothing
/// in Quarry assumes a global default when reading existing data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 32-byte output. Default for new entries.
    Blake3,
    /// SHA-256, 32-byte output.
    Sha256,
    /// MD5, 16-byte output. Accepted when reading old pointer files only.
    Md5,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 3] = [Self::Blake3, Self::Sha256, Self::Md5];

    /// Length of a digest in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Blake3 | Self::Sha256 => 32,
            Self::Md5 => 16,
        }
    }

    /// Weak legacy algorithms may be read and verified but never used to
    /// track new content.
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Md5)
    }

    /// Canonical lowercase name, as written to pointer files and storage keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blake3 => "blake3",
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Blake3
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            other => Err(TypeError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for algo in HashAlgorithm::ALL {
            assert_eq!(algo.as_str().parse::<HashAlgorithm>().unwrap(), algo);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        let err = "crc32".parse::<HashAlgorithm>().unwrap_err();
        assert_eq!(err, TypeError::UnknownAlgorithm("crc32".into()));
    }

    #[test]
    fn only_md5_is_legacy() {
        assert!(HashAlgorithm::Md5.is_legacy());
        assert!(!HashAlgorithm::Blake3.is_legacy());
        assert!(!HashAlgorithm::Sha256.is_legacy());
    }

    #[test]
    fn default_is_blake3() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Blake3);
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&HashAlgorithm::Sha256).unwrap();
        assert_eq!(json, "\"sha256\"");
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithm::HashAlgorithm;
use crate::error::TypeError;

/// Content-addressed identifier for a blob.
///
/// A `Digest` pairs the hash bytes with the algorithm that produced them.
/// Two digests are equal only if both the algorithm and the bytes match, so a
/// BLAKE3 and a SHA-256 digest never collide as storage keys.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest {
    algorithm: HashAlgorithm,
    bytes: Vec<u8>,
}

impl Digest {
    /// Build a digest from raw hash output, checking its length.
    pub fn new(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Result<Self, TypeError> {
        if bytes.len() != algorithm.output_len() {
            return Err(TypeError::InvalidLength {
                algorithm: algorithm.to_string(),
                expected: algorithm.output_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { algorithm, bytes })
    }

    /// Parse from a hex string produced by [`Digest::to_hex`].
    pub fn from_hex(algorithm: HashAlgorithm, s: &str) -> Result<Self, TypeError> {
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(TypeError::InvalidHex(format!("{s}: digest hex must be lowercase")));
        }
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::new(algorithm, bytes)
    }

    /// Parse a blob reference of the form `<algorithm>/<hex>`.
    pub fn from_blob_ref(s: &str) -> Result<Self, TypeError> {
        let (algo, hex) = s
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidHex(format!("{s}: missing algorithm prefix")))?;
        Self::from_hex(algo.parse()?, hex)
    }

    /// The algorithm that produced this digest.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex encoding of the hash bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.bytes[..4])
    }

    /// Storage key shared by the cache and every remote: `<algorithm>/<hex>`.
    pub fn blob_ref(&self) -> String {
        format!("{}/{}", self.algorithm, self.to_hex())
    }

    /// Relative path with two-level prefix sharding:
    /// `<algorithm>/<hex[0..2]>/<hex[2..4]>/<hex>`.
    pub fn shard_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}/{}/{}", self.algorithm, &hex[0..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({}:{})", self.algorithm, self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(algorithm: HashAlgorithm, fill: u8) -> Digest {
        Digest::new(algorithm, vec![fill; algorithm.output_len()]).unwrap()
    }

    #[test]
    fn hex_roundtrip() {
        let d = sample(HashAlgorithm::Blake3, 0xab);
        let parsed = Digest::from_hex(HashAlgorithm::Blake3, &d.to_hex()).unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn wrong_length_rejected() {
        let err = Digest::new(HashAlgorithm::Sha256, vec![0; 16]).unwrap_err();
        assert!(matches!(err, TypeError::InvalidLength { expected: 32, actual: 16, .. }));
    }

    #[test]
    fn md5_is_sixteen_bytes() {
        let d = sample(HashAlgorithm::Md5, 1);
        assert_eq!(d.to_hex().len(), 32);
        assert!(Digest::from_hex(HashAlgorithm::Md5, &"00".repeat(32)).is_err());
    }

    #[test]
    fn uppercase_hex_rejected() {
        let err = Digest::from_hex(HashAlgorithm::Blake3, &"AB".repeat(32)).unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn algorithm_is_part_of_identity() {
        let a = sample(HashAlgorithm::Blake3, 7);
        let b = sample(HashAlgorithm::Sha256, 7);
        assert_eq!(a.to_hex(), b.to_hex());
        assert_ne!(a, b);
    }

    #[test]
    fn shard_path_layout() {
        let d = Digest::from_hex(HashAlgorithm::Blake3, &format!("5b05{}", "0".repeat(60))).unwrap();
        assert_eq!(d.shard_path(), format!("blake3/5b/05/5b05{}", "0".repeat(60)));
    }

    #[test]
    fn blob_ref_roundtrip() {
        let d = sample(HashAlgorithm::Sha256, 0x3c);
        assert_eq!(d.blob_ref(), format!("sha256/{}", d.to_hex()));
        assert_eq!(Digest::from_blob_ref(&d.blob_ref()).unwrap(), d);
    }

    #[test]
    fn blob_ref_without_prefix_rejected() {
        assert!(Digest::from_blob_ref(&"ab".repeat(32)).is_err());
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(sample(HashAlgorithm::Md5, 9).short_hex().len(), 8);
    }

    proptest! {
        #[test]
        fn any_valid_bytes_roundtrip_through_hex(bytes in proptest::collection::vec(any::<u8>(), 32)) {
            let d = Digest::new(HashAlgorithm::Blake3, bytes).unwrap();
            prop_assert_eq!(Digest::from_hex(HashAlgorithm::Blake3, &d.to_hex()).unwrap(), d);
        }
    }
}

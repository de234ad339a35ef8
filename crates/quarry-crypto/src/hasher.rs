use std::io::{self, Read};

use md5::Md5;
use quarry_types::{Digest, HashAlgorithm};
use sha2::{Digest as _, Sha256};

/// Size of the buffer used when hashing a reader. Memory use while hashing is
/// bounded by this value regardless of input size.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

enum State {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
    Md5(Md5),
}

/// Incremental content hasher.
///
/// Feed bytes with [`update`](Self::update) in any chunking; the resulting
/// [`Digest`] only depends on the concatenated bytes and the algorithm.
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    state: State,
}

impl ContentHasher {
    /// Start a new hash computation.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Blake3 => State::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => State::Md5(Md5::new()),
        };
        Self { algorithm, state }
    }

    /// The algorithm this hasher computes.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Blake3(h) => {
                h.update(data);
            }
            State::Sha256(h) => h.update(data),
            State::Md5(h) => h.update(data),
        }
    }

    /// Consume the hasher and produce the digest.
    pub fn finalize(self) -> Digest {
        let bytes = match self.state {
            State::Blake3(h) => h.finalize().as_bytes().to_vec(),
            State::Sha256(h) => h.finalize().to_vec(),
            State::Md5(h) => h.finalize().to_vec(),
        };
        // Output length is fixed per algorithm, so construction cannot fail.
        match Digest::new(self.algorithm, bytes) {
            Ok(digest) => digest,
            Err(e) => unreachable!("hash output length mismatch: {e}"),
        }
    }

    /// Hash an in-memory byte slice.
    pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Digest {
        let mut hasher = Self::new(algorithm);
        hasher.update(data);
        hasher.finalize()
    }

    /// Hash a reader to the end, returning the digest and the number of bytes
    /// consumed.
    ///
    /// Any read error aborts the computation: a digest is only produced when
    /// the whole stream was read.
    pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> io::Result<(Digest, u64)> {
        let mut hasher = Self::new(algorithm);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
            total += n as u64;
        }
        Ok((hasher.finalize(), total))
    }

    /// Verify that data produces the expected digest (using the digest's own
    /// algorithm).
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::hash(expected.algorithm(), data) == *expected
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hash_is_deterministic() {
        let a = ContentHasher::hash(HashAlgorithm::Blake3, b"hello world");
        let b = ContentHasher::hash(HashAlgorithm::Blake3, b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn known_sha256_vector() {
        let d = ContentHasher::hash(HashAlgorithm::Sha256, b"abc");
        assert_eq!(
            d.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn known_md5_vector() {
        let d = ContentHasher::hash(HashAlgorithm::Md5, b"abc");
        assert_eq!(d.to_hex(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn blake3_matches_reference() {
        let d = ContentHasher::hash(HashAlgorithm::Blake3, b"abc");
        assert_eq!(d.as_bytes(), blake3::hash(b"abc").as_bytes());
    }

    #[test]
    fn algorithms_disagree() {
        let a = ContentHasher::hash(HashAlgorithm::Blake3, b"same");
        let b = ContentHasher::hash(HashAlgorithm::Sha256, b"same");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn reader_counts_bytes() {
        let data = vec![7u8; READ_BUFFER_SIZE * 3 + 11];
        let (digest, n) = ContentHasher::hash_reader(HashAlgorithm::Blake3, &data[..]).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(digest, ContentHasher::hash(HashAlgorithm::Blake3, &data));
    }

    #[test]
    fn reader_error_yields_no_digest() {
        struct Broken(usize);
        impl Read for Broken {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device gone"));
                }
                self.0 -= 1;
                buf[0] = 1;
                Ok(1)
            }
        }
        let err = ContentHasher::hash_reader(HashAlgorithm::Sha256, Broken(5)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn verify_detects_tampering() {
        let d = ContentHasher::hash(HashAlgorithm::Blake3, b"original");
        assert!(ContentHasher::verify(b"original", &d));
        assert!(!ContentHasher::verify(b"tampered", &d));
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_digest(data in proptest::collection::vec(any::<u8>(), 0..4096), split in 0usize..4096) {
            let split = split.min(data.len());
            for algo in HashAlgorithm::ALL {
                let mut h = ContentHasher::new(algo);
                h.update(&data[..split]);
                h.update(&data[split..]);
                prop_assert_eq!(h.finalize(), ContentHasher::hash(algo, &data));
            }
        }
    }
}

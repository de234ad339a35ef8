use std::io::{self, Read};

use quarry_types::{Digest, HashAlgorithm};

use crate::hasher::ContentHasher;

/// A [`Read`] adapter that hashes every byte read through it.
///
/// The digest is only meaningful once the inner reader reports end of stream.
pub struct HashingReader<R> {
    inner: R,
    hasher: ContentHasher,
    read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: ContentHasher::new(algorithm),
            read: 0,
        }
    }

    /// Bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Consume the adapter and return the digest and byte count.
    pub fn finish(self) -> (Digest, u64) {
        (self.hasher.finalize(), self.read)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_through_reader_matches_direct_hash() {
        let data = vec![7u8; 200_000];
        let mut r = HashingReader::new(&data[..], HashAlgorithm::Blake3);
        let mut sink = Vec::new();
        io::copy(&mut r, &mut sink).unwrap();
        assert_eq!(r.bytes_read(), data.len() as u64);
        let (digest, n) = r.finish();
        assert_eq!(n, data.len() as u64);
        assert_eq!(sink, data);
        assert_eq!(digest, ContentHasher::hash(HashAlgorithm::Blake3, &data));
    }

    #[test]
    fn partial_read_differs() {
        let data = b"0123456789";
        let mut r = HashingReader::new(&data[..], HashAlgorithm::Sha256);
        let mut buf = [0u8; 4];
        r.read_exact(&mut buf).unwrap();
        let (digest, n) = r.finish();
        assert_eq!(n, 4);
        assert_ne!(digest, ContentHasher::hash(HashAlgorithm::Sha256, data));
    }
}

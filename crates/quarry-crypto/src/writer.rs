use std::io::{self, Write};

use quarry_types::{Digest, HashAlgorithm};

use crate::hasher::ContentHasher;

/// A [`Write`] adapter that hashes every byte written through it.
///
/// Used to copy a blob into its destination while computing its digest in the
/// same pass.
pub struct HashingWriter<W> {
    inner: W,
    hasher: ContentHasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: ContentHasher::new(algorithm),
            written: 0,
        }
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the inner writer and return it together with the digest and
    /// byte count.
    pub fn finish(mut self) -> io::Result<(W, Digest, u64)> {
        self.inner.flush()?;
        Ok((self.inner, self.hasher.finalize(), self.written))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        // Only hash what the inner writer accepted.
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_hashes_and_counts() {
        let data = b"the quick brown fox".repeat(1000);
        let mut w = HashingWriter::new(Vec::new(), HashAlgorithm::Sha256);
        io::copy(&mut &data[..], &mut w).unwrap();
        let (out, digest, n) = w.finish().unwrap();
        assert_eq!(out, data);
        assert_eq!(n, data.len() as u64);
        assert_eq!(digest, ContentHasher::hash(HashAlgorithm::Sha256, &data));
    }

    #[test]
    fn short_writes_hash_only_accepted_bytes() {
        struct OneByte(Vec<u8>);
        impl Write for OneByte {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.push(buf[0]);
                Ok(1)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut w = HashingWriter::new(OneByte(Vec::new()), HashAlgorithm::Blake3);
        w.write_all(b"abcdef").unwrap();
        assert_eq!(w.written(), 6);
        let (_, digest, _) = w.finish().unwrap();
        assert_eq!(digest, ContentHasher::hash(HashAlgorithm::Blake3, b"abcdef"));
    }
}

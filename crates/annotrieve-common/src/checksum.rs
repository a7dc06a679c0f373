//! Checksum utilities for streamed content
//!
//! Annotation archives publish MD5 sums of the *uncompressed* files, so the
//! digest here is always folded over decompressed bytes, one chunk at a time.

/// Running MD5 over a byte stream that arrives in chunks
pub struct Md5Accumulator {
    context: md5::Context,
    bytes: u64,
}

impl Md5Accumulator {
    pub fn new() -> Self {
        Self {
            context: md5::Context::new(),
            bytes: 0,
        }
    }

    /// Fold one chunk into the digest
    pub fn update(&mut self, chunk: &[u8]) {
        self.context.consume(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes folded so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest of everything folded so far
    pub fn hex_digest(self) -> String {
        format!("{:x}", self.context.compute())
    }
}

impl Default for Md5Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

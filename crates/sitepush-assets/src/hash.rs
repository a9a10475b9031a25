//! Content fingerprints for cache-busting.
//!
//! A [`ContentToken`] is the first [`TOKEN_LEN`] hex characters of the SHA-256
//! digest of a file's bytes. Tokens only need to tell apart versions of the
//! same asset within one deployment, so the short form is enough.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
pub const TOKEN_LEN: usize = 8;

/// Read buffer size used when hashing files.
const CHUNK_SIZE: usize = 64 * 1024;

/// Short, deterministic fingerprint of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentToken(String);

impl ContentToken {
    fn from_digest(digest: impl AsRef<[u8]>) -> Self {
        let mut hex = hex::encode(digest);
        hex.truncate(TOKEN_LEN);
        Self(hex)
    }

    /// The token as a lowercase hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint an in-memory buffer.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> ContentToken {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentToken::from_digest(hasher.finalize())
}

/// Fingerprint the full contents of a file.
///
/// The file is streamed in chunks. Any read error is returned as is, so a
/// token is only produced once every byte has been seen.
pub fn hash_file(path: &Path) -> io::Result<ContentToken> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..read]);
    }
    Ok(ContentToken::from_digest(hasher.finalize()))
}

//! Content hashing of source libraries
//!
//! Stored entries carry the SHA-1 of the library they were produced from.
//! A mismatch with the live file means the stored entry is stale.

use sha1::{Digest, Sha1};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

const READ_CHUNK: usize = 64 * 1024;

/// SHA-1 digest of a source file's contents
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHash([u8; 20]);

impl SourceHash {
    /// Hash an in-memory byte slice
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self::from_digest(hasher)
    }

    fn from_digest(hasher: Sha1) -> Self {
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceHash({})", &hex::encode(self.0)[..12])
    }
}

impl FromStr for SourceHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// Hash a file's contents with SHA-1, streaming it in chunks
pub fn hash_file(path: &Path) -> io::Result<SourceHash> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(SourceHash::from_digest(hasher))
}

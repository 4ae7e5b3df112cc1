// SPDX-License-Identifier: AGPL-3.0
// Copyright (C) 2025 histsync Contributors

//! Streaming content hashes in `<algorithm>:<hex>` form

use crate::error::{LfsError, LfsResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Read size for hashing; memory use is independent of file size
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    fn hex_len(&self) -> usize {
        // Both produce 32-byte digests.
        64
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = LfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(LfsError::InvalidHash(format!(
                "unsupported hash algorithm: {}",
                other
            ))),
        }
    }
}

enum StreamingHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => StreamingHasher::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => StreamingHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamingHasher::Sha256(h) => h.update(data),
            StreamingHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            StreamingHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamingHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash a reader in [`HASH_CHUNK_SIZE`] chunks
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> io::Result<String> {
    let mut hasher = StreamingHasher::new(algorithm);
    let mut buf = [0u8; HASH_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{}:{}", algorithm, hasher.finalize_hex()))
}

/// Hash a file on the current thread
pub fn hash_file_blocking(path: &Path, algorithm: HashAlgorithm) -> io::Result<String> {
    hash_reader(File::open(path)?, algorithm)
}

/// Hash a file on the blocking pool
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> LfsResult<String> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || hash_file_blocking(&path, algorithm)).await??;
    Ok(digest)
}

/// Split and validate `<algorithm>:<hex>`
pub fn parse_hash(value: &str) -> LfsResult<(HashAlgorithm, &str)> {
    let (algo, hex) = value.split_once(':').ok_or_else(|| {
        LfsError::InvalidHash(format!("hash must be '<algorithm>:<hex>', got: {}", value))
    })?;
    let algorithm: HashAlgorithm = algo.parse()?;
    if hex.len() != algorithm.hex_len() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LfsError::InvalidHash(format!(
            "invalid {} digest: {}",
            algorithm, hex
        )));
    }
    Ok((algorithm, hex))
}

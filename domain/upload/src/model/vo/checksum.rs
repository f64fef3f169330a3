use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use md5::Md5;
use sha2::{Digest, Sha256};

/// Digest algorithm used for chunk integrity checks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChecksumAlgorithm {
    #[default]
    Blake3,
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Blake3 => "blake3",
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Md5 => "md5",
        }
    }

    /// Length of the hex digest.
    pub fn hex_len(&self) -> usize {
        match self {
            ChecksumAlgorithm::Blake3 | ChecksumAlgorithm::Sha256 => 64,
            ChecksumAlgorithm::Md5 => 32,
        }
    }

    /// Lowercase hex digest of `content`.
    pub fn digest(&self, content: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Blake3 => blake3::hash(content).to_hex().to_string(),
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(content)),
            ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(content)),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            other => anyhow::bail!("Unsupported checksum algorithm: {other}"),
        }
    }
}

/// Checksum supplied by the client with each chunk.
///
/// Accepted forms are `<algo>:<hex>` and a bare `<hex>`. A bare digest uses the default algorithm,
/// except a 32 digit one, which can only be MD5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkChecksum {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex.
    pub value: String,
}

impl ChunkChecksum {
    pub fn parse(raw: &str, default_algorithm: ChecksumAlgorithm) -> anyhow::Result<Self> {
        let raw = raw.trim();
        let (algorithm, value) = match raw.split_once(':') {
            Some((algo, value)) => (algo.parse()?, value),
            None if raw.len() == ChecksumAlgorithm::Md5.hex_len() => {
                (ChecksumAlgorithm::Md5, raw)
            }
            None => (default_algorithm, raw),
        };
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Checksum must be a non-empty hex string, got: {raw:?}");
        }
        if value.len() != algorithm.hex_len() {
            anyhow::bail!("A {algorithm} checksum has {} hex digits, got: {raw:?}", algorithm.hex_len());
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Ok when `content` hashes to this checksum, otherwise the actual digest.
    pub fn verify(&self, content: &[u8]) -> Result<(), String> {
        let actual = self.algorithm.digest(content);
        if actual == self.value {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl fmt::Display for ChunkChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

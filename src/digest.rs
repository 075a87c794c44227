use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use crate::Error;

/// algorithm name for sha256 digests
pub const SHA256: &str = "sha256";

/// content hash identifying one filesystem layer, `algorithm:encoded`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerDigest {
    algorithm: String,
    encoded: String,
}

impl LayerDigest {
    /// parse from `algorithm:encoded` form
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidDigest(s.to_string()))?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"+._-".contains(&b));
        let encoded_ok = !encoded.is_empty()
            && encoded
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"=_-".contains(&b));
        if !algorithm_ok || !encoded_ok {
            return Err(Error::InvalidDigest(s.to_string()));
        }

        if algorithm == SHA256
            && (encoded.len() != 64
                || !encoded
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
        {
            return Err(Error::InvalidDigest(s.to_string()));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            encoded: encoded.to_string(),
        })
    }

    /// sha256 digest of the given bytes
    pub fn sha256_of(data: &[u8]) -> Self {
        Self {
            algorithm: SHA256.to_string(),
            encoded: hex::encode(Sha256::digest(data)),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// digest value without the algorithm prefix
    ///
    /// safe to use as a flat file name: the character set excludes `/`.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    /// whether this crate can recompute the digest from layer content
    pub fn is_verifiable(&self) -> bool {
        self.algorithm == SHA256
    }

    /// short form for log lines
    pub fn short(&self) -> &str {
        &self.encoded[..self.encoded.len().min(12)]
    }
}

impl FromStr for LayerDigest {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl fmt::Debug for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerDigest({}:{})", self.algorithm, self.short())
    }
}

impl Serialize for LayerDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LayerDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// reader that sha256-hashes every byte passing through it
pub struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// read the rest of the stream, then return (hex digest, total bytes)
    pub fn finish(mut self) -> io::Result<(String, u64)> {
        io::copy(&mut self, &mut io::sink())?;
        Ok((hex::encode(self.hasher.finalize()), self.bytes))
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

//! Tarball integrity verification

use crate::{PackageError, Result};
use sha2::Digest;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const BUFFER_SIZE: usize = 64 * 1024;

/// Hash algorithms accepted in registry integrity blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Hash everything the reader yields, as lower-case hex
    pub fn digest_reader<R: Read>(self, reader: R) -> std::io::Result<String> {
        match self {
            HashAlgorithm::Sha256 => stream::<sha2::Sha256, R>(reader),
            HashAlgorithm::Sha512 => stream::<sha2::Sha512, R>(reader),
            HashAlgorithm::Md5 => stream::<md5::Md5, R>(reader),
        }
    }

    pub fn digest_bytes(self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => to_hex(&sha2::Sha256::digest(bytes)),
            HashAlgorithm::Sha512 => to_hex(&sha2::Sha512::digest(bytes)),
            HashAlgorithm::Md5 => to_hex(&md5::Md5::digest(bytes)),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(PackageError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn stream<D: Digest, R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hash a file with the given algorithm
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let file = File::open(path)?;
    Ok(algorithm.digest_reader(file)?)
}

/// Verify a file against an expected hex digest.
///
/// The comparison is exact, so an upper-case expected digest never matches.
pub fn verify_file(path: &Path, algorithm: &str, expected: &str) -> Result<()> {
    let algorithm: HashAlgorithm = algorithm.parse()?;
    let actual = hash_file(path, algorithm)?;
    if actual != expected {
        return Err(PackageError::IntegrityMismatch {
            algorithm: algorithm.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

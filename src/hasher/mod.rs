//
// Copyright (c) 2025 Nathan Fiedler
//

//! Content hashes that identify chunks.
//!
//! Every algorithm renders its digest as lower-case hexadecimal so that chunk
//! identifiers can be written to manifests and compared as plain strings.
//! CRC32 is offered for compatibility with older manifests; it is a checksum
//! rather than a collision-resistant hash and should not be used to
//! deduplicate large data sets.

use std::fmt;
use std::str::FromStr;

use sha2::Digest;

use crate::{Error, Result};

///
/// The algorithms available for computing chunk hashes.
///
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum HashAlgorithm {
    /// CRC-32 (IEEE), 8 hex digits.
    Crc32,
    /// MD5, 32 hex digits.
    Md5,
    /// SHA-1, 40 hex digits.
    Sha1,
    /// SHA-256, 64 hex digits.
    #[default]
    Sha256,
    /// SHA-512, 128 hex digits.
    Sha512,
    /// BLAKE3 with the default 32 byte output, 64 hex digits.
    Blake3,
}

impl HashAlgorithm {
    /// All supported algorithms.
    pub const ALL: [HashAlgorithm; 6] = [
        HashAlgorithm::Crc32,
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    /// Canonical name, as written to manifests.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Crc32 => "CRC32",
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Length of the hex encoded digest.
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Crc32 => 8,
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Blake3 => 64,
        }
    }

    ///
    /// Compute the hex encoded digest of the given data.
    ///
    pub fn hash_hex(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Crc32 => format!("{:08x}", crc32fast::hash(data)),
            HashAlgorithm::Md5 => hex::encode(md5::Md5::digest(data)),
            HashAlgorithm::Sha1 => hex::encode(sha1::Sha1::digest(data)),
            HashAlgorithm::Sha256 => hex::encode(sha2::Sha256::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(sha2::Sha512::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "");
        match normalized.as_str() {
            "CRC32" => Ok(HashAlgorithm::Crc32),
            "MD5" => Ok(HashAlgorithm::Md5),
            "SHA1" => Ok(HashAlgorithm::Sha1),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            "BLAKE3" => Ok(HashAlgorithm::Blake3),
            _ => Err(Error::UnsupportedAlgorithm(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(HashAlgorithm::Crc32.hash_hex(b"123456789"), "cbf43926");
        assert_eq!(
            HashAlgorithm::Md5.hash_hex(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            HashAlgorithm::Sha1.hash_hex(b"abc"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            HashAlgorithm::Sha256.hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            HashAlgorithm::Sha512.hash_hex(b"abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_digest_lengths() {
        for algorithm in HashAlgorithm::ALL {
            let digest = algorithm.hash_hex(b"some chunk of data");
            assert_eq!(digest.len(), algorithm.digest_len(), "{algorithm}");
            assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
            assert_eq!(digest, digest.to_ascii_lowercase());
        }
    }

    #[test]
    fn test_crc32_leading_zeros_kept() {
        // the CRC32 of an empty input is zero
        assert_eq!(HashAlgorithm::Crc32.hash_hex(b""), "00000000");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-1".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha1);
        assert_eq!("crc32".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Crc32);
        assert_eq!("Blake3".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Blake3);
        for algorithm in HashAlgorithm::ALL {
            assert_eq!(algorithm.to_string().parse::<HashAlgorithm>().unwrap(), algorithm);
        }
        let err = "whirlpool".parse::<HashAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(name) if name == "whirlpool"));
    }

    #[test]
    fn test_default_is_sha256() {
        assert_eq!(HashAlgorithm::default(), HashAlgorithm::Sha256);
    }
}

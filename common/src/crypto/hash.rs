use parity_scale_codec::{Decode, Encode};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    convert::TryInto,
    fmt::{Display, Error, Formatter},
    str::FromStr,
};

use super::CryptoError;

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug, Hash, Encode, Decode)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash::new([0; HASH_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let len = bytes.len();
        let bytes: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidHashLength {
                len,
                expected: HASH_SIZE,
            })?;
        Ok(Hash::new(bytes))
    }
}

/// Hash a byte slice with blake2b-256, the ledger's hashing function for
/// call hashes, block hashes and multisig account entropy.
#[inline(always)]
pub fn blake2_256(value: &[u8]) -> Hash {
    Hash(sp_crypto_hashing::blake2_256(value))
}

/// Keccak-256, used for Ethereum-style account derivation and signing prehash.
pub fn keccak_256(value: &[u8]) -> [u8; HASH_SIZE] {
    use sha3::{Digest, Keccak256};

    let mut hasher = Keccak256::new();
    hasher.update(value);
    hasher.finalize().into()
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "0x{}", &self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'a> Deserialize<'a> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        Hash::from_str(&hex).map_err(SerdeError::custom)
    }
}

/// Anything with a canonical SCALE encoding can be fingerprinted.
pub trait Hashable: Encode {
    #[inline(always)]
    fn hash(&self) -> Hash {
        self.using_encoded(blake2_256)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake2_256_empty_input() {
        assert_eq!(
            blake2_256(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn test_keccak_256_empty_input() {
        assert_eq!(
            hex::encode(keccak_256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_display_and_parse() {
        let hash = blake2_256(b"para");
        let shown = hash.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.parse::<Hash>().unwrap(), hash);
        assert_eq!(hash.to_hex().parse::<Hash>().unwrap(), hash);
    }

    #[test]
    fn test_hash_parse_rejects_wrong_length() {
        let err = "0xabcd".parse::<Hash>().unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidHashLength {
                len: 2,
                expected: HASH_SIZE
            }
        );
    }

    #[test]
    fn test_hash_serde_roundtrip() {
        let hash = blake2_256(b"serde");
        let json = serde_json::to_string(&hash).unwrap();
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}

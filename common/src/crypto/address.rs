use parity_scale_codec::{Decode, Encode};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use super::CryptoError;

pub const ADDRESS_SIZE: usize = 20;

/// 20-byte account identifier shared by the Substrate runtime and its
/// Ethereum execution layer.
///
/// Ordering is plain lexicographic byte order. Multisig account derivation
/// depends on it, so it must never be changed to a checksum or display order.
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Hash, Encode, Decode)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    pub const fn zero() -> Self {
        Address([0; ADDRESS_SIZE])
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; ADDRESS_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidAddressLength {
                    len: slice.len(),
                    expected: ADDRESS_SIZE,
                })?;
        Ok(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Address::from_slice(&bytes)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'a> Deserialize<'a> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(SerdeError::custom)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_and_without_prefix() {
        let a: Address = "0xf24FF3a9CF04c71Dbc94D0b566f7A27B94566cac".parse().unwrap();
        let b: Address = "f24ff3a9cf04c71dbc94d0b566f7a27b94566cac".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0xf24ff3a9cf04c71dbc94d0b566f7a27b94566cac");
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(matches!(
            "0x1234".parse::<Address>(),
            Err(CryptoError::InvalidAddressLength { len: 2, .. })
        ));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(CryptoError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let low = Address::new([0x01; ADDRESS_SIZE]);
        let mut high_bytes = [0x00; ADDRESS_SIZE];
        high_bytes[0] = 0x02;
        let high = Address::new(high_bytes);
        assert!(low < high);
    }

    #[test]
    fn test_scale_encoding_is_raw_bytes() {
        let addr = Address::new([7u8; ADDRESS_SIZE]);
        assert_eq!(addr.encode(), vec![7u8; ADDRESS_SIZE]);
    }
}

//! secp256k1 signer identities for the Ethereum-compatible account model.
//!
//! Accounts are 20-byte addresses derived from the uncompressed public key
//! (`keccak256(x || y)[12..]`). Transactions are signed over the keccak-256
//! prehash of the signing payload with a recoverable signature, so the ledger
//! can check a signature by recovering the signer address.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use parity_scale_codec::{Decode, Encode};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{keccak_256, Address, CryptoError, ADDRESS_SIZE};

/// Size of a secp256k1 secret key in bytes.
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a compressed SEC1 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Size of a recoverable signature (`r || s || v`) in bytes.
pub const SIGNATURE_SIZE: usize = 65;

/// secp256k1 secret key (32 bytes).
///
/// The secret key is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    /// Create a secret key from raw bytes.
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a secret key from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidSecretKey);
        }
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Create a secret key from a hex string, with or without `0x`.
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut bytes = hex::decode(hex).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let secret = Self::from_slice(&bytes);
        bytes.zeroize();
        secret
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Compressed secp256k1 public key.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse a SEC1-encoded (compressed or uncompressed) public key.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Compressed SEC1 encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.0.to_encoded_point(true);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Ethereum-style account address of this key.
    pub fn to_address(&self) -> Address {
        address_of(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag, hash x || y
    let digest = keccak_256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; ADDRESS_SIZE];
    bytes.copy_from_slice(&digest[32 - ADDRESS_SIZE..]);
    Address::new(bytes)
}

/// Recoverable ECDSA signature (`r || s || v`, 65 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct EcdsaSignature([u8; SIGNATURE_SIZE]);

impl EcdsaSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            )));
        }
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Recover the address that produced this signature over `message`.
    pub fn recover(&self, message: &[u8]) -> Result<Address, CryptoError> {
        let prehash = keccak_256(message);
        let signature = Signature::from_slice(&self.0[..64])
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.0[64])
            .ok_or_else(|| CryptoError::InvalidSignature("invalid recovery id".to_string()))?;
        let key = VerifyingKey::recover_from_prehash(&prehash, &signature, recovery_id)
            .map_err(|_| CryptoError::VerificationFailed)?;
        Ok(address_of(&key))
    }

    /// Check that `signer` produced this signature over `message`.
    pub fn verify(&self, message: &[u8], signer: &Address) -> Result<(), CryptoError> {
        if self.recover(message)? == *signer {
            Ok(())
        } else {
            Err(CryptoError::VerificationFailed)
        }
    }
}

impl fmt::Debug for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaSignature({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for EcdsaSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EcdsaSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A signer identity: secp256k1 signing key plus its derived address.
///
/// `SigningKey` zeroizes itself on drop.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Generate a new random key pair using the OS RNG.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_secret(secret: &SecretKey) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(secret.as_bytes()).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_secret_hex(hex: &str) -> Result<Self, CryptoError> {
        Self::from_secret(&SecretKey::from_hex(hex)?)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    pub fn secret_key(&self) -> SecretKey {
        let mut bytes = [0u8; SECRET_KEY_SIZE];
        bytes.copy_from_slice(&self.signing_key.to_bytes());
        SecretKey::from_bytes(bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().clone())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign the keccak-256 prehash of `message`.
    pub fn sign(&self, message: &[u8]) -> Result<EcdsaSignature, CryptoError> {
        let prehash = keccak_256(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = recovery_id.to_byte();
        Ok(EcdsaSignature(bytes))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for KeyPair {}

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hexadecimal string format
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Hash has invalid length
    #[error("Invalid hash length: {len} bytes, expected: {expected} bytes")]
    InvalidHashLength { len: usize, expected: usize },

    /// Address has invalid length
    #[error("Invalid address length: {len} bytes, expected: {expected} bytes")]
    InvalidAddressLength { len: usize, expected: usize },

    /// Secret key bytes are not a valid secp256k1 scalar
    #[error("Invalid secret key")]
    InvalidSecretKey,

    /// Public key bytes are not a valid SEC1 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Signature has invalid length or encoding
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Signing failed inside the ECDSA backend
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Recovered signer does not match the expected address
    #[error("Signature verification failed")]
    VerificationFailed,
}

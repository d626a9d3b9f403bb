mod address;
mod hash;

pub mod ecdsa;
pub mod error;

pub use address::*;
pub use error::CryptoError;
pub use hash::*;

pub use ecdsa::{EcdsaSignature, KeyPair, PublicKey, SecretKey};

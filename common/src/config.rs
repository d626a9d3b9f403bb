// Protocol constants mirrored from the parachain runtime.
//
// These must stay in sync with the runtime under test: the multisig prefix in
// particular is part of the wallet address derivation.

// Well-known development accounts (secp256k1, Ethereum-style addresses).
// Alith is the default funding account on dev chains.
pub const ALITH_SECRET: &str = "0x5fb92d6e98884f76de468fa3f6278f8807c48bebc13595d45af5bdc4da702133";
pub const BALTATHAR_SECRET: &str =
    "0x8075991ce870b93a8870eca0c0f91913d12f47948ca0fd25b49c6fa7cdbeee8b";
pub const CHARLETH_SECRET: &str =
    "0x0b6e18cafb6ed99687ec547bd28139cafdd2bffe70e6b688025de6b445aa5c5b";
pub const DOROTHY_SECRET: &str =
    "0x39539ab1876910bbf3a223d84a29e28f1cb4e2e456503e7e91ed39b2e7223d68";

// Native token has 18 decimals
pub const UNIT: u128 = 1_000_000_000_000_000_000;
pub const MILLI_UNIT: u128 = UNIT / 1_000;

// Accounts whose free balance drops below this are reaped
pub const EXISTENTIAL_DEPOSIT: u128 = MILLI_UNIT;

// Flat fee charged to the signer of every included extrinsic
pub const TRANSACTION_FEE: u128 = MILLI_UNIT;

// Entropy prefix of the multisig account derivation
pub const MULTISIG_ENTROPY_PREFIX: &[u8; 16] = b"modlpy/utilisuba";
pub const MAX_SIGNATORIES: u16 = 100;
// Reserved from the proposer: base + factor * threshold
pub const MULTISIG_DEPOSIT_BASE: u128 = 10 * MILLI_UNIT;
pub const MULTISIG_DEPOSIT_FACTOR: u128 = MILLI_UNIT;

pub const MAX_BATCH_CALLS: usize = 1_024;

// Signing payloads longer than this are signed through their blake2-256 digest
pub const MAX_RAW_SIGNING_PAYLOAD: usize = 256;

// Extrinsic index 0 of every block is the timestamp inherent
pub const FIRST_EXTRINSIC_INDEX: u32 = 1;

pub const DEFAULT_MORTALITY_PERIOD: u32 = 64;
pub const DEFAULT_BLOCK_TIME_MS: u64 = 12_000;
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9944";
pub const DEFAULT_SETTLEMENT_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 6_000;

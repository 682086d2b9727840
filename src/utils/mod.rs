//! Utility functions and helpers
//!
//! Hashing, base58, ECDSA helpers and the bincode layer used by the key store.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, finish_sha256d, new_key_pair, ripemd160_digest,
    sha256_digest, sha256d_digest,
};

pub use serialization::{deserialize, serialize};

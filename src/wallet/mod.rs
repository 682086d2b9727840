//! Key management for signing inputs
//!
//! Keys live in a PIN-protected store and are only decrypted while a
//! transaction is being signed.

pub mod cipher;
pub mod keystore;
#[allow(clippy::module_inception)]
pub mod wallet;

pub use cipher::{Aes256GcmCipher, EncryptionResult, KdfParams, SecureKey};
pub use keystore::EncryptedKeyStore;
pub use wallet::Wallet;

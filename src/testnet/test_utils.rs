//! Test utilities for the send pipeline

use crate::config::KeystoreConfig;
use crate::core::{unlocking_data, Address, Credentials, Input, Network, TimeSource};
use crate::error::{Result, SendError};
use crate::network::{SubmissionGateway, SubmissionReceipt};
use crate::wallet::EncryptedKeyStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const TEST_PIN: &str = "123456";

/// Clock frozen at one instant.
pub struct FixedClock(pub u32);

impl TimeSource for FixedClock {
    fn now(&self) -> Result<u32> {
        Ok(self.0)
    }
}

/// Deterministic valid address for `seed`.
pub fn test_address(network: Network, seed: u8) -> String {
    Address::from_public_key(&[seed; 65], network).encode()
}

/// Credentials returning a fixed-size dummy blob per input, counting calls.
#[derive(Clone)]
pub struct FakeCredentials {
    calls: Arc<AtomicUsize>,
    locked: bool,
}

impl Default for FakeCredentials {
    fn default() -> Self {
        FakeCredentials::new()
    }
}

impl FakeCredentials {
    pub fn new() -> FakeCredentials {
        FakeCredentials {
            calls: Arc::new(AtomicUsize::new(0)),
            locked: false,
        }
    }

    /// Credentials that always report a wrong PIN.
    pub fn locked() -> FakeCredentials {
        FakeCredentials {
            locked: true,
            ..FakeCredentials::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Credentials for FakeCredentials {
    fn sign_inputs(&self, inputs: &[Input], digest: &[u8; 32], _pin: &str) -> Result<Vec<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.locked {
            return Err(SendError::CredentialUnavailable("Wrong PIN".to_string()));
        }
        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(digest);
        inputs
            .iter()
            .map(|_| unlocking_data(&signature, &[0x04; 65]))
            .collect()
    }
}

/// Gateway that records every submission and answers with a canned reply.
#[derive(Clone)]
pub struct RecordingGateway {
    submitted: Arc<Mutex<Vec<String>>>,
    rejection: Option<String>,
}

impl RecordingGateway {
    pub fn accepting() -> RecordingGateway {
        RecordingGateway {
            submitted: Arc::new(Mutex::new(vec![])),
            rejection: None,
        }
    }

    pub fn rejecting(message: &str) -> RecordingGateway {
        RecordingGateway {
            rejection: Some(message.to_string()),
            ..RecordingGateway::accepting()
        }
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted
            .lock()
            .map(|submitted| submitted.clone())
            .unwrap_or_default()
    }
}

impl SubmissionGateway for RecordingGateway {
    fn submit(&self, tx_hex: &str) -> Result<SubmissionReceipt> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(tx_hex.to_string());
        }
        match &self.rejection {
            Some(message) => Err(SendError::SubmissionRejected(message.clone())),
            None => Ok(SubmissionReceipt {
                tx_hash: None,
                message: None,
            }),
        }
    }
}

/// Key store settings with Argon2 costs low enough for tests.
pub fn fast_keystore_config(dir: &TempDir) -> KeystoreConfig {
    KeystoreConfig {
        path: dir.path().join("keystore.dat"),
        min_pin_length: 4,
        memory_kib: 64,
        iterations: 1,
    }
}

/// A key store in a temporary directory holding one key.
pub fn create_test_keystore(network: Network) -> Result<(EncryptedKeyStore, String, TempDir)> {
    let dir = tempfile::tempdir()?;
    let mut store = EncryptedKeyStore::open(&fast_keystore_config(&dir), network)?;
    let address = store.create_key(TEST_PIN)?;
    Ok((store, address, dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse_address;

    #[test]
    fn test_fixture_addresses_parse() {
        let address = test_address(Network::Mainnet, 3);
        assert!(parse_address(&address, Network::Mainnet).is_ok());
        assert_ne!(address, test_address(Network::Mainnet, 4));
    }

    #[test]
    fn test_recording_gateway() {
        let gateway = RecordingGateway::rejecting("nope");
        assert!(gateway.submit("abcd").is_err());
        assert_eq!(gateway.submitted(), vec!["abcd".to_string()]);
    }

    #[test]
    fn test_keystore_fixture_signs() {
        let (store, address, _dir) = create_test_keystore(Network::Testnet).unwrap();
        let input = Input::new(crate::core::Hash256::new([0u8; 32]), 0).with_owner(address);
        assert_eq!(store.sign_inputs(&[input], &[1u8; 32], TEST_PIN).unwrap().len(), 1);
    }
}

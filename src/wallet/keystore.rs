use crate::config::KeystoreConfig;
use crate::core::{Credentials, Input, Network};
use crate::error::{Result, SendError};
use crate::utils::{deserialize, serialize};
use crate::wallet::cipher::{
    derive_key_from_pin, generate_salt, Aes256GcmCipher, EncryptionResult, KdfParams,
};
use crate::wallet::Wallet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use zeroize::Zeroizing;

// Sealed with the store key so a wrong PIN is detected before any entry is
// touched.
const PIN_VERIFIER: &[u8] = b"tokensend key store";

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct StoredKey {
    public_key: Vec<u8>,
    sealed: EncryptionResult,
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
struct KeyStoreFile {
    network: String,
    salt: Vec<u8>,
    kdf: KdfParams,
    verifier: EncryptionResult,
    entries: BTreeMap<String, StoredKey>,
}

/// PIN-protected store of signing keys, indexed by address.
///
/// Every key is sealed with AES-256-GCM under one store key derived from the
/// PIN with Argon2id. Keys are decrypted only for the duration of a signing
/// call.
pub struct EncryptedKeyStore {
    path: PathBuf,
    network: Network,
    min_pin_length: usize,
    kdf: KdfParams,
    file: Option<KeyStoreFile>,
}

impl EncryptedKeyStore {
    /// Open the store at the configured path, or start an empty one if the
    /// file does not exist yet.
    pub fn open(config: &KeystoreConfig, network: Network) -> Result<EncryptedKeyStore> {
        let mut store = EncryptedKeyStore {
            path: config.path.clone(),
            network,
            min_pin_length: config.min_pin_length,
            kdf: config.kdf_params(),
            file: None,
        };

        if store.path.exists() {
            let mut file = File::open(&store.path)?;
            let mut buf = vec![];
            file.read_to_end(&mut buf)?;
            let contents: KeyStoreFile = deserialize(&buf)?;

            if contents.network != network.to_string() {
                return Err(SendError::Config(format!(
                    "Key store {} belongs to {}, not {network}",
                    store.path.display(),
                    contents.network
                )));
            }
            info!(
                "Loaded key store {} with {} keys",
                store.path.display(),
                contents.entries.len()
            );
            store.file = Some(contents);
        }

        Ok(store)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.file
            .as_ref()
            .map(|file| file.entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.file
            .as_ref()
            .is_some_and(|file| file.entries.contains_key(address))
    }

    /// Generate a key, seal it under `pin` and persist the store. The first
    /// key fixes the PIN; later keys must use the same one.
    pub fn create_key(&mut self, pin: &str) -> Result<String> {
        if pin.chars().count() < self.min_pin_length {
            return Err(SendError::CredentialUnavailable(format!(
                "PIN must be at least {} characters long",
                self.min_pin_length
            )));
        }

        let (cipher, mut file) = match self.file.take() {
            Some(file) => match unlock(&file, pin) {
                Ok(cipher) => (cipher, file),
                Err(e) => {
                    self.file = Some(file);
                    return Err(e);
                }
            },
            None => {
                let salt = generate_salt();
                let cipher = Aes256GcmCipher::new(derive_key_from_pin(pin, &salt, self.kdf)?)?;
                let verifier = cipher.encrypt(PIN_VERIFIER)?;
                let file = KeyStoreFile {
                    network: self.network.to_string(),
                    salt,
                    kdf: self.kdf,
                    verifier,
                    entries: BTreeMap::new(),
                };
                (cipher, file)
            }
        };

        let wallet = Wallet::new()?;
        let address = wallet.get_address(self.network).encode();
        let sealed = cipher.encrypt(wallet.get_pkcs8());
        let sealed = match sealed {
            Ok(sealed) => sealed,
            Err(e) => {
                self.file = Some(file);
                return Err(e);
            }
        };
        file.entries.insert(
            address.clone(),
            StoredKey {
                public_key: wallet.get_public_key().to_vec(),
                sealed,
            },
        );
        self.file = Some(file);
        self.save()?;

        info!("Created key for address {address}");
        Ok(address)
    }

    fn save(&self) -> Result<()> {
        let Some(file) = self.file.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let bytes = serialize(file)?;
        let out = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(out);
        writer.write_all(&bytes)?;
        writer.flush()?;
        debug!("Saved key store to {}", self.path.display());
        Ok(())
    }
}

fn unlock(file: &KeyStoreFile, pin: &str) -> Result<Aes256GcmCipher> {
    let key = derive_key_from_pin(pin, &file.salt, file.kdf)?;
    let cipher = Aes256GcmCipher::new(key)?;
    match cipher.decrypt(&file.verifier) {
        Ok(plain) if plain == PIN_VERIFIER => Ok(cipher),
        _ => Err(SendError::CredentialUnavailable("Wrong PIN".to_string())),
    }
}

fn entry_for<'a>(file: &'a KeyStoreFile, position: usize, input: &Input) -> Result<&'a StoredKey> {
    match input.get_owner() {
        Some(owner) => file.entries.get(owner).ok_or_else(|| {
            SendError::CredentialUnavailable(format!("No key for address {owner}"))
        }),
        None if file.entries.len() == 1 => file
            .entries
            .values()
            .next()
            .ok_or_else(|| SendError::CredentialUnavailable("Key store is empty".to_string())),
        None => Err(SendError::CredentialUnavailable(format!(
            "Input {position} has no owner and the key store holds {} keys",
            file.entries.len()
        ))),
    }
}

impl Credentials for EncryptedKeyStore {
    fn sign_inputs(&self, inputs: &[Input], digest: &[u8; 32], pin: &str) -> Result<Vec<Vec<u8>>> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| SendError::CredentialUnavailable("Key store has no keys".to_string()))?;
        let cipher = unlock(file, pin)?;

        let mut signatures = Vec::with_capacity(inputs.len());
        for (position, input) in inputs.iter().enumerate() {
            let stored = entry_for(file, position, input)?;
            let pkcs8 = Zeroizing::new(cipher.decrypt(&stored.sealed)?);
            let wallet = Wallet::from_pkcs8(pkcs8.to_vec())?;
            signatures.push(wallet.sign(digest)?);
        }
        debug!("Signed {} inputs", signatures.len());
        Ok(signatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signer::parse_unlocking_data;
    use crate::core::Hash256;
    use crate::utils::ecdsa_p256_sha256_sign_verify;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> KeystoreConfig {
        KeystoreConfig {
            path: dir.path().join("keys.dat"),
            min_pin_length: 4,
            memory_kib: 64,
            iterations: 1,
        }
    }

    fn owned_input(owner: Option<&str>) -> Input {
        let input = Input::new(Hash256::new([1u8; 32]), 0);
        match owner {
            Some(owner) => input.with_owner(owner),
            None => input,
        }
    }

    #[test]
    fn test_create_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let mut store = EncryptedKeyStore::open(&config, Network::Testnet).unwrap();
        assert!(store.get_addresses().is_empty());
        let address = store.create_key("1234").unwrap();

        let reopened = EncryptedKeyStore::open(&config, Network::Testnet).unwrap();
        assert_eq!(reopened.get_addresses(), vec![address.clone()]);
        assert!(reopened.contains(&address));
    }

    #[test]
    fn test_signs_for_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        let first = store.create_key("1234").unwrap();
        let second = store.create_key("1234").unwrap();

        let digest = [5u8; 32];
        let inputs = vec![owned_input(Some(&second)), owned_input(Some(&first))];
        let signatures = store.sign_inputs(&inputs, &digest, "1234").unwrap();
        assert_eq!(signatures.len(), 2);

        let file = store.file.as_ref().unwrap();
        for (data, owner) in signatures.iter().zip([&second, &first]) {
            let (signature, public_key) = parse_unlocking_data(data).unwrap();
            assert_eq!(public_key, file.entries[owner].public_key);
            assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, &digest));
        }
    }

    #[test]
    fn test_single_key_signs_unowned_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        store.create_key("1234").unwrap();

        let inputs = vec![owned_input(None), owned_input(None)];
        assert_eq!(store.sign_inputs(&inputs, &[0u8; 32], "1234").unwrap().len(), 2);
    }

    #[test]
    fn test_wrong_pin_is_credential_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        store.create_key("1234").unwrap();

        let err = store
            .sign_inputs(&[owned_input(None)], &[0u8; 32], "9999")
            .unwrap_err();
        assert!(matches!(err, SendError::CredentialUnavailable(_)));

        let err = store.create_key("9999").unwrap_err();
        assert!(matches!(err, SendError::CredentialUnavailable(_)));
        assert_eq!(store.get_addresses().len(), 1);
    }

    #[test]
    fn test_unknown_owner_and_ambiguous_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        store.create_key("1234").unwrap();
        store.create_key("1234").unwrap();

        let unknown = owned_input(Some("WZ7pDnkPnxbs14GHdUFivFzPbzitwNtvZo"));
        assert!(matches!(
            store.sign_inputs(&[unknown], &[0u8; 32], "1234"),
            Err(SendError::CredentialUnavailable(_))
        ));
        assert!(matches!(
            store.sign_inputs(&[owned_input(None)], &[0u8; 32], "1234"),
            Err(SendError::CredentialUnavailable(_))
        ));
    }

    #[test]
    fn test_empty_store_cannot_sign() {
        let dir = tempfile::tempdir().unwrap();
        let store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        assert!(matches!(
            store.sign_inputs(&[owned_input(None)], &[0u8; 32], "1234"),
            Err(SendError::CredentialUnavailable(_))
        ));
    }

    #[test]
    fn test_short_pin_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EncryptedKeyStore::open(&test_config(&dir), Network::Testnet).unwrap();
        assert!(store.create_key("12").is_err());
        assert!(!dir.path().join("keys.dat").exists());
    }

    #[test]
    fn test_network_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let mut store = EncryptedKeyStore::open(&config, Network::Testnet).unwrap();
        store.create_key("1234").unwrap();

        assert!(matches!(
            EncryptedKeyStore::open(&config, Network::Mainnet),
            Err(SendError::Config(_))
        ));
    }
}

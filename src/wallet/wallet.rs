use crate::core::{unlocking_data, Address, Network};
use crate::error::{Result, SendError};
use crate::utils::{ecdsa_p256_sha256_sign_digest, new_key_pair};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use zeroize::ZeroizeOnDrop;

/// A P-256 signing key held in memory only while a send is being signed.
#[derive(ZeroizeOnDrop)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        Wallet::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    SendError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self, network: Network) -> Address {
        Address::from_public_key(&self.public_key, network)
    }

    /// Uncompressed SEC1 point, 65 bytes.
    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }

    /// Unlocking data for one input: signature over `digest` and the public key.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>> {
        let signature = ecdsa_p256_sha256_sign_digest(&self.pkcs8, digest)?;
        unlocking_data(&signature, &self.public_key)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("public_key", &data_encoding::HEXLOWER.encode(&self.public_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signer::parse_unlocking_data;
    use crate::utils::ecdsa_p256_sha256_sign_verify;

    #[test]
    fn test_public_key_is_uncompressed_point() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(wallet.get_public_key().len(), 65);
        assert_eq!(wallet.get_public_key()[0], 0x04);
    }

    #[test]
    fn test_reload_from_pkcs8_keeps_address() {
        let wallet = Wallet::new().unwrap();
        let reloaded = Wallet::from_pkcs8(wallet.get_pkcs8().to_vec()).unwrap();
        assert_eq!(
            wallet.get_address(Network::Mainnet),
            reloaded.get_address(Network::Mainnet)
        );
    }

    #[test]
    fn test_sign_produces_verifiable_unlocking_data() {
        let wallet = Wallet::new().unwrap();
        let digest = [9u8; 32];

        let data = wallet.sign(&digest).unwrap();
        let (signature, public_key) = parse_unlocking_data(&data).unwrap();

        assert_eq!(signature.len(), 64);
        assert_eq!(public_key, wallet.get_public_key());
        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, &digest));
    }

    #[test]
    fn test_invalid_pkcs8_rejected() {
        assert!(matches!(
            Wallet::from_pkcs8(vec![1, 2, 3]),
            Err(SendError::Crypto(_))
        ));
    }
}

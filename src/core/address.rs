//! Human-readable addresses and the destination scripts they map to
//!
//! An address is base58 over `version | hash160 | checksum`. The version
//! byte carries both the network and the script kind.

use crate::error::{Result, SendError};
use crate::utils::{base58_decode, base58_encode, ripemd160_digest, sha256_digest, sha256d_digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
pub const ADDRESS_HASH_LEN: usize = 20;
pub const ADDRESS_LEN: usize = 1 + ADDRESS_HASH_LEN + ADDRESS_CHECK_SUM_LEN;

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_GREATERTHAN_TIMESTAMP: u8 = 0x6f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    fn version_byte(self, kind: AddressKind) -> u8 {
        match (self, kind) {
            (Network::Mainnet, AddressKind::P2pkh) => 0x28,
            (Network::Mainnet, AddressKind::P2sh) => 0x64,
            (Network::Testnet, AddressKind::P2pkh) => 0x49,
            (Network::Testnet, AddressKind::P2sh) => 0x87,
        }
    }

    fn kind_for_version(self, version: u8) -> Option<AddressKind> {
        [AddressKind::P2pkh, AddressKind::P2sh]
            .into_iter()
            .find(|kind| self.version_byte(*kind) == version)
    }
}

impl FromStr for Network {
    type Err = SendError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(SendError::Config(format!(
                "Invalid network: {s}. Valid options: mainnet, testnet"
            ))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Pay to public key hash
    P2pkh,
    /// Pay to script hash
    P2sh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    network: Network,
    kind: AddressKind,
    hash: [u8; ADDRESS_HASH_LEN],
}

impl Address {
    pub fn new(network: Network, kind: AddressKind, hash: [u8; ADDRESS_HASH_LEN]) -> Address {
        Address {
            network,
            kind,
            hash,
        }
    }

    /// P2PKH address of a public key.
    pub fn from_public_key(public_key: &[u8], network: Network) -> Address {
        let mut hash = [0u8; ADDRESS_HASH_LEN];
        hash.copy_from_slice(&hash_pub_key(public_key));
        Address::new(network, AddressKind::P2pkh, hash)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn hash(&self) -> &[u8; ADDRESS_HASH_LEN] {
        &self.hash
    }

    /// Base58 form: version + hash + checksum.
    pub fn encode(&self) -> String {
        let mut payload: Vec<u8> = Vec::with_capacity(ADDRESS_LEN);
        payload.push(self.network.version_byte(self.kind));
        payload.extend(self.hash);
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum);
        base58_encode(payload.as_slice())
    }

    /// Destination script locking an output to this address, optionally
    /// unspendable before `timelock`.
    pub fn output_script(&self, timelock: Option<u32>) -> Vec<u8> {
        let mut script = vec![];
        if let Some(timelock) = timelock {
            script.push(4);
            script.extend(timelock.to_be_bytes());
            script.push(OP_GREATERTHAN_TIMESTAMP);
        }
        match self.kind {
            AddressKind::P2pkh => {
                script.push(OP_DUP);
                script.push(OP_HASH160);
                script.push(ADDRESS_HASH_LEN as u8);
                script.extend(self.hash);
                script.push(OP_EQUALVERIFY);
                script.push(OP_CHECKSIG);
            }
            AddressKind::P2sh => {
                script.push(OP_HASH160);
                script.push(ADDRESS_HASH_LEN as u8);
                script.extend(self.hash);
                script.push(OP_EQUAL);
            }
        }
        script
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> [u8; ADDRESS_CHECK_SUM_LEN] {
    let digest = sha256d_digest(payload);
    let mut out = [0u8; ADDRESS_CHECK_SUM_LEN];
    out.copy_from_slice(&digest[..ADDRESS_CHECK_SUM_LEN]);
    out
}

/// Decode a base58 address for `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    let payload = base58_decode(address.trim())?;
    if payload.len() != ADDRESS_LEN {
        return Err(SendError::Address(format!(
            "{address}: expected {ADDRESS_LEN} bytes, got {}",
            payload.len()
        )));
    }

    let (body, actual_checksum) = payload.split_at(ADDRESS_LEN - ADDRESS_CHECK_SUM_LEN);
    if checksum(body) != actual_checksum {
        return Err(SendError::Address(format!("{address}: invalid checksum")));
    }

    let version = body[0];
    let kind = network.kind_for_version(version).ok_or_else(|| {
        SendError::Address(format!(
            "{address}: version byte 0x{version:02x} is not valid on {network}"
        ))
    })?;

    let mut hash = [0u8; ADDRESS_HASH_LEN];
    hash.copy_from_slice(&body[1..]);
    Ok(Address::new(network, kind, hash))
}

/// Recover the address and timelock from a standard destination script.
pub fn parse_output_script(script: &[u8], network: Network) -> Option<(Address, Option<u32>)> {
    let (timelock, rest) = match script {
        [4, a, b, c, d, OP_GREATERTHAN_TIMESTAMP, rest @ ..] => {
            (Some(u32::from_be_bytes([*a, *b, *c, *d])), rest)
        }
        _ => (None, script),
    };

    let (kind, hash) = match rest {
        [OP_DUP, OP_HASH160, 20, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG]
            if hash.len() == ADDRESS_HASH_LEN =>
        {
            (AddressKind::P2pkh, hash)
        }
        [OP_HASH160, 20, hash @ .., OP_EQUAL] if hash.len() == ADDRESS_HASH_LEN => {
            (AddressKind::P2sh, hash)
        }
        _ => return None,
    };

    let mut out = [0u8; ADDRESS_HASH_LEN];
    out.copy_from_slice(hash);
    Some((Address::new(network, kind, out), timelock))
}

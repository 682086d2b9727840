// The transaction model and its canonical byte layout.
//
// A serialized transaction is three sections back to back:
//   funds  - version, counts, tokens, inputs, outputs
//   graph  - weight, timestamp, parents
//   nonce  - u32
// The sighash covers the funds section with every input's data left empty,
// so signatures stay valid while mining rewrites timestamp and nonce.

use crate::core::codec::{count_u8, encode_output_value, len_u16, ByteReader};
use crate::error::{Result, SendError};
use crate::utils::{finish_sha256d, sha256_digest, sha256d_digest};
use data_encoding::HEXLOWER;
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_TX_VERSION: u16 = 1;
pub const HASH_LEN: usize = 32;

/// Display form of the native token, which never appears in the token list.
pub const NATIVE_TOKEN_UID: &str = "00";

/// Token index 0 always refers to the native token.
pub const NATIVE_TOKEN_INDEX: u8 = 0;

/// Token data bits that carry the token index.
pub const TOKEN_INDEX_MASK: u8 = 0x7f;

/// A 32-byte hash identifying a transaction or a custom token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256([u8; HASH_LEN]);

pub type TxId = Hash256;
pub type TokenUid = Hash256;

impl Hash256 {
    pub fn new(bytes: [u8; HASH_LEN]) -> Hash256 {
        Hash256(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Hash256> {
        let bytes = HEXLOWER
            .decode(hex.trim().to_lowercase().as_bytes())
            .map_err(|e| SendError::Serialization(format!("Invalid hash hex {hex}: {e}")))?;
        let bytes: [u8; HASH_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            SendError::Serialization(format!("Hash must be {HASH_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Hash256(bytes))
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

/// Reference to an output being spent, plus the unlocking data proving the
/// right to spend it once signed.
#[derive(Debug, Clone, PartialEq)]
pub struct Input {
    tx_id: TxId,
    index: u8,
    data: Vec<u8>,
    // Address that owns the referenced output. Only used to pick a signing
    // key, never serialized.
    owner: Option<String>,
}

impl Input {
    pub fn new(tx_id: TxId, index: u8) -> Input {
        Input {
            tx_id,
            index,
            data: vec![],
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Input {
        self.owner = Some(owner.into());
        self
    }

    pub fn get_tx_id(&self) -> &TxId {
        &self.tx_id
    }

    pub fn get_index(&self) -> u8 {
        self.index
    }

    pub fn get_data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn get_owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn is_signed(&self) -> bool {
        !self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    value: u64,
    token_data: u8,
    script: Vec<u8>,
}

impl Output {
    pub fn new(value: u64, token_data: u8, script: Vec<u8>) -> Result<Output> {
        // validates the amount up front
        encode_output_value(value)?;
        Ok(Output {
            value,
            token_data,
            script,
        })
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_token_data(&self) -> u8 {
        self.token_data
    }

    pub fn get_token_index(&self) -> u8 {
        self.token_data & TOKEN_INDEX_MASK
    }

    pub fn get_script(&self) -> &[u8] {
        self.script.as_slice()
    }
}

/// Outcome of a successful nonce search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningResult {
    pub hash: [u8; HASH_LEN],
    pub nonce: u32,
    pub timestamp: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    version: u16,
    weight: f64,
    timestamp: u32,
    nonce: u32,
    tokens: Vec<TokenUid>,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    parents: Vec<TxId>,
}

impl Transaction {
    pub fn new(tokens: Vec<TokenUid>, inputs: Vec<Input>, outputs: Vec<Output>) -> Transaction {
        Transaction {
            version: DEFAULT_TX_VERSION,
            weight: 0.0,
            timestamp: 0,
            nonce: 0,
            tokens,
            inputs,
            outputs,
            parents: vec![],
        }
    }

    pub fn get_version(&self) -> u16 {
        self.version
    }

    pub fn get_weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    pub fn get_timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    pub fn get_nonce(&self) -> u32 {
        self.nonce
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    pub fn get_tokens(&self) -> &[TokenUid] {
        self.tokens.as_slice()
    }

    pub fn get_inputs(&self) -> &[Input] {
        self.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[Output] {
        self.outputs.as_slice()
    }

    pub fn get_parents(&self) -> &[TxId] {
        self.parents.as_slice()
    }

    pub fn set_parents(&mut self, parents: Vec<TxId>) {
        self.parents = parents;
    }

    pub fn is_signed(&self) -> bool {
        self.inputs.iter().all(Input::is_signed)
    }

    /// Sum of output values, saturating at `u64::MAX`.
    pub fn get_output_value(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, out| acc.saturating_add(out.value))
    }

    /// Digest that every input signs: double SHA-256 of the funds section
    /// with empty input data.
    pub fn sighash(&self) -> Result<[u8; HASH_LEN]> {
        let data = self.funds_bytes(false)?;
        Ok(sha256d_digest(&data))
    }

    /// Write one unlocking blob per input, in input order. Nothing is written
    /// when the counts differ.
    pub fn merge_signatures(&mut self, signatures: Vec<Vec<u8>>) -> Result<()> {
        if signatures.len() != self.inputs.len() {
            return Err(SendError::SignatureCountMismatch {
                expected: self.inputs.len(),
                actual: signatures.len(),
            });
        }
        for (input, data) in self.inputs.iter_mut().zip(signatures) {
            input.data = data;
        }
        Ok(())
    }

    /// Everything that precedes the nonce: the bytes a miner hashes once and
    /// then extends with each candidate nonce.
    pub fn pow_prefix(&self) -> Result<Vec<u8>> {
        let mut data = self.funds_bytes(true)?;
        data.extend(self.graph_bytes()?);
        Ok(data)
    }

    /// Full wire encoding, including weight, timestamp, parents and nonce.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = self.pow_prefix()?;
        data.extend(self.nonce.to_be_bytes());
        Ok(data)
    }

    pub fn to_hex(&self) -> Result<String> {
        Ok(HEXLOWER.encode(&self.to_bytes()?))
    }

    /// Double SHA-256 of the full encoding, the value proof of work is
    /// checked against.
    pub fn hash(&self) -> Result<[u8; HASH_LEN]> {
        let prefix = self.pow_prefix()?;
        Ok(pow_hash(&prefix, self.nonce))
    }

    pub fn apply_mining_result(&mut self, result: &MiningResult) {
        self.nonce = result.nonce;
        self.timestamp = result.timestamp;
    }

    fn check_tokens(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for token in &self.tokens {
            if !seen.insert(token) {
                return Err(SendError::Serialization(format!(
                    "Duplicate token {token} in token list"
                )));
            }
        }
        for output in &self.outputs {
            if output.get_token_index() as usize > self.tokens.len() {
                return Err(SendError::Serialization(format!(
                    "Output token index {} out of range for {} tokens",
                    output.get_token_index(),
                    self.tokens.len()
                )));
            }
        }
        Ok(())
    }

    fn funds_bytes(&self, include_input_data: bool) -> Result<Vec<u8>> {
        self.check_tokens()?;

        let mut data = vec![];
        data.extend(self.version.to_be_bytes());
        data.push(count_u8(self.tokens.len(), "tokens")?);
        data.push(count_u8(self.inputs.len(), "inputs")?);
        data.push(count_u8(self.outputs.len(), "outputs")?);

        for token in &self.tokens {
            data.extend(token.as_bytes());
        }

        for input in &self.inputs {
            data.extend(input.tx_id.as_bytes());
            data.push(input.index);
            if include_input_data {
                data.extend(len_u16(input.data.len(), "Input data")?.to_be_bytes());
                data.extend(&input.data);
            } else {
                data.extend(0u16.to_be_bytes());
            }
        }

        for output in &self.outputs {
            data.extend(encode_output_value(output.value)?);
            data.push(output.token_data);
            data.extend(len_u16(output.script.len(), "Output script")?.to_be_bytes());
            data.extend(&output.script);
        }

        Ok(data)
    }

    fn graph_bytes(&self) -> Result<Vec<u8>> {
        let mut data = vec![];
        data.extend(self.weight.to_be_bytes());
        data.extend(self.timestamp.to_be_bytes());
        data.push(count_u8(self.parents.len(), "parents")?);
        for parent in &self.parents {
            data.extend(parent.as_bytes());
        }
        Ok(data)
    }

    /// Parse a full wire encoding. Trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Transaction> {
        let mut reader = ByteReader::new(bytes);

        let version = reader.read_u16()?;
        let tokens_len = reader.read_u8()?;
        let inputs_len = reader.read_u8()?;
        let outputs_len = reader.read_u8()?;

        let mut tokens = Vec::with_capacity(tokens_len as usize);
        for _ in 0..tokens_len {
            tokens.push(Hash256::new(reader.read_array()?));
        }

        let mut inputs = Vec::with_capacity(inputs_len as usize);
        for _ in 0..inputs_len {
            let tx_id = Hash256::new(reader.read_array()?);
            let index = reader.read_u8()?;
            let data_len = reader.read_u16()?;
            let data = reader.read_bytes(data_len as usize)?.to_vec();
            inputs.push(Input {
                tx_id,
                index,
                data,
                owner: None,
            });
        }

        let mut outputs = Vec::with_capacity(outputs_len as usize);
        for _ in 0..outputs_len {
            let value = reader.read_output_value()?;
            let token_data = reader.read_u8()?;
            let script_len = reader.read_u16()?;
            let script = reader.read_bytes(script_len as usize)?.to_vec();
            outputs.push(Output {
                value,
                token_data,
                script,
            });
        }

        let weight = reader.read_f64()?;
        let timestamp = reader.read_u32()?;
        let parents_len = reader.read_u8()?;
        let mut parents = Vec::with_capacity(parents_len as usize);
        for _ in 0..parents_len {
            parents.push(Hash256::new(reader.read_array()?));
        }
        let nonce = reader.read_u32()?;

        if !reader.is_empty() {
            return Err(SendError::Serialization(format!(
                "{} trailing bytes after transaction",
                reader.remaining().len()
            )));
        }

        let tx = Transaction {
            version,
            weight,
            timestamp,
            nonce,
            tokens,
            inputs,
            outputs,
            parents,
        };
        tx.check_tokens()?;
        Ok(tx)
    }

    pub fn from_hex(hex: &str) -> Result<Transaction> {
        let bytes = HEXLOWER
            .decode(hex.trim().to_lowercase().as_bytes())
            .map_err(|e| SendError::Serialization(format!("Invalid transaction hex: {e}")))?;
        Transaction::from_bytes(&bytes)
    }
}

/// Proof-of-work hash of `prefix` followed by `nonce`.
pub fn pow_hash(prefix: &[u8], nonce: u32) -> [u8; HASH_LEN] {
    let mut data = Vec::with_capacity(prefix.len() + 4);
    data.extend_from_slice(prefix);
    data.extend(nonce.to_be_bytes());
    finish_sha256d(&sha256_digest(&data))
}

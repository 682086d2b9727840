//! # Tokensend - Client-Side Token Transfers
//!
//! This crate builds a token transfer on the client, signs it, mines its
//! proof of work and hands it to a node. When I come back to this code,
//! here's what I need to remember:
//!
//! ## What It Does
//! - **Wire Codec**: Big-endian funds/graph/nonce layout and the sighash over it
//! - **Signing**: P-256 keys sealed in a PIN-protected key store
//! - **Difficulty**: Weight formula and the `2^(256 - weight)` target
//! - **Mining**: Midstate nonce search on a background worker with cancellation
//! - **Submission**: JSON POST to the node and a websocket event stream
//!
//! ## How the Code Is Organized
//! - `core/`: Transaction model, codec, addresses, signing, difficulty, miner, assembler
//! - `worker/`: The mining thread and its cancellation token
//! - `wallet/`: Keys, the encrypted key store and its cipher
//! - `network/`: HTTP submission gateway and the event stream
//! - `send/`: The pipeline tying assemble, sign, mine and submit together
//! - `config/`: TOML configuration with environment overrides
//! - `utils/`: Hashing, base58 and bincode helpers
//! - `cli/`: Command-line interface
//!
//! ## Where to Start
//! 1. `send/pipeline.rs` for the whole flow
//! 2. `core/transaction.rs` for the byte layout
//! 3. `core/proof_of_work.rs` for the nonce search

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod send;
pub mod utils;
pub mod wallet;
pub mod worker;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    calculate_tx_weight, target_from_weight, Address, Credentials, Miner, MiningOutcome, Network,
    TokenForm, TokenRef, Transaction, TransactionAssembler,
};
pub use error::{Result, SendError};
pub use network::{EventStream, HttpGateway, SubmissionGateway, SubmissionReceipt};
pub use send::{PreparedTransaction, SendOutcome, SendSettings, SendTokens};
pub use wallet::{EncryptedKeyStore, Wallet};
pub use worker::{CancelToken, MiningWorker};

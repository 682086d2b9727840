//! Core transaction functionality
//!
//! This module contains the transaction model and wire codec, addresses,
//! signing, the difficulty target, the proof-of-work miner and the
//! assembler that turns user forms into a transaction.

pub mod address;
pub mod assembler;
pub mod codec;
pub mod difficulty;
pub mod proof_of_work;
pub mod signer;
pub mod transaction;

pub use address::{parse_address, parse_output_script, Address, AddressKind, Network};
pub use assembler::{InputSpec, OutputSpec, TokenForm, TokenRef, TransactionAssembler};
pub use codec::{decode_output_value, encode_output_value, MAX_OUTPUT_VALUE, MAX_OUTPUT_VALUE_32};
pub use difficulty::{calculate_tx_weight, target_from_weight, WeightConstants};
pub use proof_of_work::{Miner, MiningOutcome, SystemTimeSource, TimeSource, MAX_NONCE};
pub use signer::{sign_tx, unlocking_data, Credentials};
pub use transaction::{
    pow_hash, Hash256, Input, MiningResult, Output, TokenUid, Transaction, TxId,
};

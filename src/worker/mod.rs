//! Background execution of the proof-of-work search
//!
//! The caller hands the worker an immutable transaction snapshot and gets
//! back exactly one outcome per job over a channel.

pub mod mining_worker;

pub use mining_worker::{CancelToken, MiningJob, MiningWorker};

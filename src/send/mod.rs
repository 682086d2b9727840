//! The send pipeline
//!
//! Ties assembly, signing, mining and submission together in the order the
//! network requires.

pub mod pipeline;

pub use pipeline::{PreparedTransaction, SendOutcome, SendSettings, SendTokens};

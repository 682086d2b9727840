//! Test fixtures
//!
//! Fake credentials, a recording gateway, a frozen clock and a cheap key
//! store for exercising the pipeline without a node.

pub mod test_utils;

pub use test_utils::*;

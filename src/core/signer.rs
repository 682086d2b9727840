//! Input signing
//!
//! The signer never touches key material. It asks a `Credentials`
//! implementation for one unlocking blob per input and writes them into the
//! transaction.

use crate::core::codec::{push_data, read_pushes};
use crate::core::{Input, Transaction};
use crate::error::{Result, SendError};
use log::debug;

/// Source of unlocking data for a transaction's inputs.
pub trait Credentials {
    /// Produce one unlocking blob per input, in input order, each proving
    /// control over the input's funds for `digest`. A wrong `pin` or a
    /// missing key yields `SendError::CredentialUnavailable`.
    fn sign_inputs(&self, inputs: &[Input], digest: &[u8; 32], pin: &str)
        -> Result<Vec<Vec<u8>>>;
}

/// Sign every input of `tx` over `digest`. On error the transaction is left
/// as it was.
pub fn sign_tx(
    tx: &mut Transaction,
    digest: &[u8; 32],
    credentials: &dyn Credentials,
    pin: &str,
) -> Result<()> {
    let signatures = credentials.sign_inputs(tx.get_inputs(), digest, pin)?;
    debug!(
        "Received {} unlocking entries for {} inputs",
        signatures.len(),
        tx.get_inputs().len()
    );
    tx.merge_signatures(signatures)
}

/// Unlocking data of a pay-to-public-key-hash input: the signature push
/// followed by the public key push.
pub fn unlocking_data(signature: &[u8], public_key: &[u8]) -> Result<Vec<u8>> {
    let mut data = push_data(signature)?;
    data.extend(push_data(public_key)?);
    Ok(data)
}

/// Split unlocking data back into `(signature, public_key)`.
pub fn parse_unlocking_data(data: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut items = read_pushes(data)?;
    if items.len() != 2 {
        return Err(SendError::Serialization(format!(
            "Unlocking data has {} items, expected 2",
            items.len()
        )));
    }
    let public_key = items.pop().unwrap_or_default();
    let signature = items.pop().unwrap_or_default();
    Ok((signature, public_key))
}

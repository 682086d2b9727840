//! Transaction assembly from per-token forms
//!
//! A send is described as an ordered list of forms, one per token being
//! moved. Assembly validates every form and only then builds the unsigned
//! transaction, so a failed assembly never leaves a half-built value behind.

use crate::core::address::{parse_address, Network};
use crate::core::transaction::{TOKEN_INDEX_MASK, NATIVE_TOKEN_INDEX};
use crate::core::{Hash256, Input, Output, TokenUid, Transaction};
use crate::error::{Result, SendError};
use log::debug;
use std::fmt;

/// Which token a form moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenRef {
    #[default]
    Native,
    Custom(TokenUid),
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenRef::Native => write!(f, "native"),
            TokenRef::Custom(uid) => write!(f, "{uid}"),
        }
    }
}

/// An input as entered by the user. `tx_id` is still hex text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub tx_id: String,
    pub index: u8,
    /// Address whose key unlocks this input.
    pub owner: Option<String>,
}

/// An output as entered by the user. The value is signed so that negative
/// entries can be reported instead of silently wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub address: String,
    pub value: i64,
    pub timelock: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenForm {
    pub token: TokenRef,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
}

impl TokenForm {
    pub fn new(token: TokenRef) -> TokenForm {
        TokenForm {
            token,
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: InputSpec) -> TokenForm {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> TokenForm {
        self.outputs.push(output);
        self
    }
}

pub struct TransactionAssembler {
    network: Network,
    forms: Vec<TokenForm>,
}

impl TransactionAssembler {
    pub fn new(network: Network) -> TransactionAssembler {
        TransactionAssembler {
            network,
            forms: vec![],
        }
    }

    pub fn get_forms(&self) -> &[TokenForm] {
        &self.forms
    }

    /// Append a form and return its position.
    pub fn add_token_form(&mut self, form: TokenForm) -> usize {
        self.forms.push(form);
        self.forms.len() - 1
    }

    pub fn remove_token_form(&mut self, index: usize) -> Result<TokenForm> {
        self.check_index(index)?;
        Ok(self.forms.remove(index))
    }

    /// Change the token a form moves, keeping its inputs and outputs.
    pub fn select_token(&mut self, index: usize, token: TokenRef) -> Result<()> {
        self.check_index(index)?;
        self.forms[index].token = token;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.forms.len() {
            return Err(SendError::IncompleteFormData(format!(
                "No token form at position {index} ({} forms)",
                self.forms.len()
            )));
        }
        Ok(())
    }

    /// Build the unsigned transaction described by the forms.
    pub fn assemble(&self) -> Result<Transaction> {
        if self.forms.is_empty() {
            return Err(SendError::IncompleteFormData(
                "No token forms to assemble".to_string(),
            ));
        }

        let mut tokens: Vec<TokenUid> = vec![];
        let mut inputs = vec![];
        let mut outputs = vec![];

        for (position, form) in self.forms.iter().enumerate() {
            if form.outputs.is_empty() {
                return Err(SendError::IncompleteFormData(format!(
                    "Token form {position} ({}) has no outputs",
                    form.token
                )));
            }

            let token_data = match form.token {
                TokenRef::Native => NATIVE_TOKEN_INDEX,
                TokenRef::Custom(uid) => token_index(&mut tokens, uid)?,
            };

            for spec in &form.inputs {
                inputs.push(self.build_input(position, spec)?);
            }
            for spec in &form.outputs {
                outputs.push(self.build_output(spec, token_data)?);
            }
        }

        if inputs.is_empty() {
            return Err(SendError::IncompleteFormData(
                "Transaction has no inputs".to_string(),
            ));
        }

        debug!(
            "Assembled {} inputs, {} outputs, {} custom tokens",
            inputs.len(),
            outputs.len(),
            tokens.len()
        );
        Ok(Transaction::new(tokens, inputs, outputs))
    }

    fn build_input(&self, position: usize, spec: &InputSpec) -> Result<Input> {
        let tx_id = Hash256::from_hex(&spec.tx_id).map_err(|e| {
            SendError::IncompleteFormData(format!("Token form {position}: bad input tx id: {e}"))
        })?;
        let input = Input::new(tx_id, spec.index);
        match &spec.owner {
            Some(owner) => {
                parse_address(owner, self.network)?;
                Ok(input.with_owner(owner.trim()))
            }
            None => Ok(input),
        }
    }

    fn build_output(&self, spec: &OutputSpec, token_data: u8) -> Result<Output> {
        let address = parse_address(&spec.address, self.network)?;
        if spec.value <= 0 {
            return Err(SendError::OutputValue(format!(
                "Output value must be positive, got {}",
                spec.value
            )));
        }
        Output::new(
            spec.value as u64,
            token_data,
            address.output_script(spec.timelock),
        )
    }
}

// Position of `uid` in the token list plus one, adding it on first sight.
fn token_index(tokens: &mut Vec<TokenUid>, uid: TokenUid) -> Result<u8> {
    let position = match tokens.iter().position(|known| *known == uid) {
        Some(position) => position,
        None => {
            tokens.push(uid);
            tokens.len() - 1
        }
    };
    let index = position + 1;
    if index > TOKEN_INDEX_MASK as usize {
        return Err(SendError::IncompleteFormData(format!(
            "Too many custom tokens: at most {TOKEN_INDEX_MASK}"
        )));
    }
    Ok(index as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::Address;

    fn address(byte: u8) -> String {
        Address::from_public_key(&[byte; 33], Network::Testnet).encode()
    }

    fn input(byte: u8) -> InputSpec {
        InputSpec {
            tx_id: Hash256::new([byte; 32]).to_hex(),
            index: byte,
            owner: None,
        }
    }

    fn output(byte: u8, value: i64) -> OutputSpec {
        OutputSpec {
            address: address(byte),
            value,
            timelock: None,
        }
    }

    fn uid(byte: u8) -> TokenUid {
        Hash256::new([byte; 32])
    }

    #[test]
    fn test_native_only() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(1))
                .with_output(output(2, 100)),
        );

        let tx = assembler.assemble().unwrap();
        assert!(tx.get_tokens().is_empty());
        assert_eq!(tx.get_inputs().len(), 1);
        assert_eq!(tx.get_outputs()[0].get_token_data(), 0);
        assert_eq!(tx.get_outputs()[0].get_value(), 100);
    }

    #[test]
    fn test_token_list_deduplicated_in_first_seen_order() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        assembler.add_token_form(
            TokenForm::new(TokenRef::Custom(uid(9)))
                .with_input(input(1))
                .with_output(output(1, 5)),
        );
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(2))
                .with_output(output(2, 6)),
        );
        assembler.add_token_form(
            TokenForm::new(TokenRef::Custom(uid(3)))
                .with_input(input(3))
                .with_output(output(3, 7)),
        );
        assembler.add_token_form(
            TokenForm::new(TokenRef::Custom(uid(9)))
                .with_input(input(4))
                .with_output(output(4, 8)),
        );

        let tx = assembler.assemble().unwrap();
        assert_eq!(tx.get_tokens(), &[uid(9), uid(3)]);

        let token_data: Vec<u8> = tx.get_outputs().iter().map(|o| o.get_token_data()).collect();
        assert_eq!(token_data, vec![1, 0, 2, 1]);

        let indexes: Vec<u8> = tx.get_inputs().iter().map(|i| i.get_index()).collect();
        assert_eq!(indexes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_empty_assembler_rejected() {
        let assembler = TransactionAssembler::new(Network::Testnet);
        assert!(matches!(
            assembler.assemble(),
            Err(SendError::IncompleteFormData(_))
        ));
    }

    #[test]
    fn test_form_without_outputs_rejected() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        assembler.add_token_form(TokenForm::new(TokenRef::Native).with_input(input(1)));
        assert!(matches!(
            assembler.assemble(),
            Err(SendError::IncompleteFormData(_))
        ));
    }

    #[test]
    fn test_malformed_tx_id_rejected() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        let mut bad = input(1);
        bad.tx_id = "zz".to_string();
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(bad)
                .with_output(output(2, 1)),
        );
        assert!(matches!(
            assembler.assemble(),
            Err(SendError::IncompleteFormData(_))
        ));
    }

    #[test]
    fn test_bad_address_rejected() {
        let mut assembler = TransactionAssembler::new(Network::Mainnet);
        // testnet address on a mainnet assembler
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(1))
                .with_output(output(2, 1)),
        );
        assert!(matches!(assembler.assemble(), Err(SendError::Address(_))));
    }

    #[test]
    fn test_non_positive_values_rejected() {
        for value in [0, -1, i64::MIN] {
            let mut assembler = TransactionAssembler::new(Network::Testnet);
            assembler.add_token_form(
                TokenForm::new(TokenRef::Native)
                    .with_input(input(1))
                    .with_output(output(2, value)),
            );
            assert!(matches!(
                assembler.assemble(),
                Err(SendError::OutputValue(_))
            ));
        }
    }

    #[test]
    fn test_timelock_reaches_script() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        let mut locked = output(2, 10);
        locked.timelock = Some(1_800_000_000);
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(1))
                .with_output(locked),
        );

        let tx = assembler.assemble().unwrap();
        let script = tx.get_outputs()[0].get_script();
        assert_eq!(&script[1..5], &1_800_000_000u32.to_be_bytes());
    }

    #[test]
    fn test_owner_address_validated_and_kept() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        let mut owned = input(1);
        owned.owner = Some(address(7));
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(owned)
                .with_output(output(2, 10)),
        );
        let tx = assembler.assemble().unwrap();
        assert_eq!(tx.get_inputs()[0].get_owner(), Some(address(7).as_str()));

        assembler.forms[0].inputs[0].owner = Some("not-an-address".to_string());
        assert!(matches!(assembler.assemble(), Err(SendError::Address(_))));
    }

    #[test]
    fn test_remove_and_select_token() {
        let mut assembler = TransactionAssembler::new(Network::Testnet);
        assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(1))
                .with_output(output(1, 1)),
        );
        let second = assembler.add_token_form(
            TokenForm::new(TokenRef::Native)
                .with_input(input(2))
                .with_output(output(2, 2)),
        );

        assembler.select_token(second, TokenRef::Custom(uid(5))).unwrap();
        let removed = assembler.remove_token_form(0).unwrap();
        assert_eq!(removed.inputs[0].index, 1);

        let tx = assembler.assemble().unwrap();
        assert_eq!(tx.get_tokens(), &[uid(5)]);
        assert_eq!(tx.get_outputs()[0].get_token_data(), 1);

        assert!(assembler.remove_token_form(3).is_err());
        assert!(assembler.select_token(1, TokenRef::Native).is_err());
    }
}

use crate::core::{InputSpec, OutputSpec};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// An input given as `txid:index[:owner]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputArg(pub InputSpec);

impl FromStr for InputArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (tx_id, index, owner) = match parts.as_slice() {
            [tx_id, index] => (tx_id, index, None),
            [tx_id, index, owner] => (tx_id, index, Some(owner.to_string())),
            _ => {
                return Err(format!(
                    "Invalid input: {s}. Expected txid:index or txid:index:owner"
                ))
            }
        };
        let index = index
            .parse::<u8>()
            .map_err(|e| format!("Invalid input index {index}: {e}"))?;
        Ok(InputArg(InputSpec {
            tx_id: tx_id.to_string(),
            index,
            owner,
        }))
    }
}

/// An output given as `address:value[:timelock]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArg(pub OutputSpec);

impl FromStr for OutputArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (address, value, timelock) = match parts.as_slice() {
            [address, value] => (address, value, None),
            [address, value, timelock] => (address, value, Some(timelock)),
            _ => {
                return Err(format!(
                    "Invalid output: {s}. Expected address:value or address:value:timelock"
                ))
            }
        };
        // signed so that negative amounts reach validation with a clear error
        let value = value
            .parse::<i64>()
            .map_err(|e| format!("Invalid output value {value}: {e}"))?;
        let timelock = timelock
            .map(|t| t.parse::<u32>())
            .transpose()
            .map_err(|e| format!("Invalid timelock: {e}"))?;
        Ok(OutputArg(OutputSpec {
            address: address.to_string(),
            value,
            timelock,
        }))
    }
}

#[derive(Debug, Parser)]
#[command(name = "tokensend", about = "Build, sign, mine and submit token transfers")]
pub struct Opt {
    #[arg(long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createkey", about = "Create a new signing key in the key store")]
    CreateKey {
        #[arg(long, env = "TOKENSEND_PIN", hide_env_values = true, help = "Key store PIN")]
        pin: String,
    },
    #[command(name = "listaddresses", about = "Print the addresses in the key store")]
    ListAddresses,
    #[command(name = "target", about = "Print the proof-of-work target for a weight")]
    Target {
        #[arg(help = "Transaction weight")]
        weight: f64,
    },
    #[command(name = "decode", about = "Decode a serialized transaction")]
    Decode {
        #[arg(help = "Transaction bytes as hex")]
        hex: String,
    },
    #[command(name = "send", about = "Send tokens")]
    Send {
        #[arg(long = "input", required = true, help = "Input as txid:index[:owner]")]
        inputs: Vec<InputArg>,
        #[arg(long = "output", required = true, help = "Output as address:value[:timelock]")]
        outputs: Vec<OutputArg>,
        #[arg(long, help = "Custom token uid; the native token when omitted")]
        token: Option<String>,
        #[arg(long, help = "Sign and mine but do not submit; print the hex")]
        dry_run: bool,
        #[arg(long, env = "TOKENSEND_PIN", hide_env_values = true, help = "Key store PIN")]
        pin: String,
    },
    #[command(name = "watch", about = "Print live events for the key store addresses")]
    Watch {
        #[arg(long = "address", help = "Address to watch instead of the key store ones")]
        addresses: Vec<String>,
    },
}

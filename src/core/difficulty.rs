use crate::core::Transaction;
use crate::error::{Result, SendError};
use log::debug;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Weight bounds accepted by `target_from_weight`.
pub const MIN_WEIGHT: f64 = 0.0;
pub const MAX_WEIGHT: f64 = 256.0;

// Bits of fractional precision carried by the target mantissa (f64 has 52).
const MANTISSA_BITS: u32 = 52;

/// Map a weight to the proof-of-work target `2^(256 - weight) - 1`.
///
/// The power of two is split into an integer shift and a fractional
/// mantissa held as 52-bit fixed point, so fractional weights are exact to
/// `f64` precision and nothing overflows. A hash is accepted when its
/// big-endian value is strictly below the returned target.
pub fn target_from_weight(weight: f64) -> Result<BigUint> {
    if !weight.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        return Err(SendError::Mining(format!(
            "Weight {weight} is outside valid range [{MIN_WEIGHT}, {MAX_WEIGHT}]"
        )));
    }

    let exponent = MAX_WEIGHT - weight;
    let whole = exponent.floor();
    let fraction = exponent - whole;
    let mantissa = (fraction.exp2() * (1u64 << MANTISSA_BITS) as f64) as u64;
    let whole = whole as u32;

    let target = if whole >= MANTISSA_BITS {
        BigUint::from(mantissa) << (whole - MANTISSA_BITS)
    } else {
        BigUint::from(mantissa) >> (MANTISSA_BITS - whole)
    };

    // mantissa >= 2^52, so target >= 1 here
    Ok(target - 1u32)
}

/// Whether a proof-of-work hash satisfies `target`.
pub fn hash_meets_target(hash: &[u8], target: &BigUint) -> bool {
    BigUint::from_bytes_be(hash) < *target
}

/// Constants of the weight formula, as advertised by the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightConstants {
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
    #[serde(default = "default_min_weight_k")]
    pub min_weight_k: f64,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl Default for WeightConstants {
    fn default() -> Self {
        Self {
            min_weight: default_min_weight(),
            coefficient: default_coefficient(),
            min_weight_k: default_min_weight_k(),
            decimal_places: default_decimal_places(),
        }
    }
}

fn default_min_weight() -> f64 {
    14.0
}

fn default_coefficient() -> f64 {
    1.6
}

fn default_min_weight_k() -> f64 {
    100.0
}

fn default_decimal_places() -> u32 {
    2
}

impl WeightConstants {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_weight", self.min_weight),
            ("coefficient", self.coefficient),
            ("min_weight_k", self.min_weight_k),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SendError::Config(format!(
                    "weight.{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Weight a transaction must be mined at, from its encoded size and the
/// amount it moves. Larger and smaller-value transactions cost more work.
pub fn calculate_tx_weight(tx: &Transaction, constants: &WeightConstants) -> Result<f64> {
    let size = tx.to_bytes()?.len() as f64;

    let unit = 10f64.powi(constants.decimal_places as i32);
    let sum_outputs = (tx.get_output_value().max(1) as f64) / unit;

    let weight = constants.coefficient * size.log2()
        + 4.0 / (1.0 + constants.min_weight_k / sum_outputs)
        + 4.0;
    let weight = weight.max(constants.min_weight);

    debug!("Transaction of {size} bytes moving {sum_outputs} has weight {weight:.4}");
    Ok(weight)
}

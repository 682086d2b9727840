//! Low-level pieces of the transaction wire format
//!
//! Every integer is big-endian. Output values use a compact 4-byte form up
//! to `MAX_OUTPUT_VALUE_32` and an 8-byte negated form above it, so the sign
//! bit of the first byte tells a reader which width follows.

use crate::error::{Result, SendError};

/// Largest value (inclusive) encoded in the compact 4-byte form.
pub const MAX_OUTPUT_VALUE_32: u64 = (1 << 31) - 1;

/// Largest value representable in the extended 8-byte form.
pub const MAX_OUTPUT_VALUE: u64 = i64::MAX as u64;

pub const OP_PUSHDATA1: u8 = 0x4c;

/// Largest push that fits in the single length byte form.
const MAX_DIRECT_PUSH: usize = 75;

/// Encode an output amount with the compact/extended width rule.
pub fn encode_output_value(value: u64) -> Result<Vec<u8>> {
    if value == 0 {
        return Err(SendError::OutputValue(
            "Output value must be positive".to_string(),
        ));
    }
    if value > MAX_OUTPUT_VALUE {
        return Err(SendError::OutputValue(format!(
            "Output value {value} exceeds maximum {MAX_OUTPUT_VALUE}"
        )));
    }

    if value <= MAX_OUTPUT_VALUE_32 {
        Ok((value as i32).to_be_bytes().to_vec())
    } else {
        Ok((-(value as i64)).to_be_bytes().to_vec())
    }
}

/// Decode an output amount, returning the value and how many bytes it used.
pub fn decode_output_value(bytes: &[u8]) -> Result<(u64, usize)> {
    let first = *bytes
        .first()
        .ok_or_else(|| SendError::Serialization("Missing output value".to_string()))?;

    if first & 0x80 == 0 {
        let raw = take_array::<4>(bytes, 0)?;
        let value = i32::from_be_bytes(raw);
        if value == 0 {
            return Err(SendError::Serialization(
                "Output value must be positive".to_string(),
            ));
        }
        return Ok((value as u64, 4));
    }

    let raw = take_array::<8>(bytes, 0)?;
    let value = i64::from_be_bytes(raw)
        .checked_neg()
        .ok_or_else(|| SendError::Serialization("Output value out of range".to_string()))?
        as u64;
    if value <= MAX_OUTPUT_VALUE_32 {
        return Err(SendError::Serialization(format!(
            "Output value {value} uses the extended form but fits in 4 bytes"
        )));
    }
    Ok((value, 8))
}

/// Script push of `data`: one length byte up to 75 bytes, `OP_PUSHDATA1`
/// followed by the length up to 255.
pub fn push_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() + 2);
    if data.len() <= MAX_DIRECT_PUSH {
        out.push(data.len() as u8);
    } else if data.len() <= u8::MAX as usize {
        out.push(OP_PUSHDATA1);
        out.push(data.len() as u8);
    } else {
        return Err(SendError::Serialization(format!(
            "Push of {} bytes is too large",
            data.len()
        )));
    }
    out.extend_from_slice(data);
    Ok(out)
}

/// Split a script into its pushed items. Fails on anything that is not a
/// data push.
pub fn read_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut reader = ByteReader::new(script);
    let mut items = vec![];
    while !reader.is_empty() {
        let op = reader.read_u8()?;
        let len = match op {
            0..=75 => op as usize,
            OP_PUSHDATA1 => reader.read_u8()? as usize,
            other => {
                return Err(SendError::Serialization(format!(
                    "Unexpected opcode 0x{other:02x} in push-only script"
                )))
            }
        };
        items.push(reader.read_bytes(len)?.to_vec());
    }
    Ok(items)
}

/// Narrow a collection length to the one-byte count the format uses.
pub fn count_u8(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len)
        .map_err(|_| SendError::Serialization(format!("Too many {what}: {len} (max 255)")))
}

/// Narrow a byte length to the two-byte prefix the format uses.
pub fn len_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len)
        .map_err(|_| SendError::Serialization(format!("{what} too long: {len} bytes")))
}

fn take_array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| SendError::Serialization(format!("Unexpected end of data, need {N} bytes")))
}

/// Cursor over a byte slice used when parsing transactions.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        ByteReader { bytes, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let out = take_array::<N>(self.bytes, self.pos)?;
        self.pos += N;
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + len).ok_or_else(|| {
            SendError::Serialization(format!("Unexpected end of data, need {len} bytes"))
        })?;
        self.pos += len;
        Ok(slice)
    }

    pub fn read_output_value(&mut self) -> Result<u64> {
        let (value, used) = decode_output_value(self.remaining())?;
        self.pos += used;
        Ok(value)
    }
}

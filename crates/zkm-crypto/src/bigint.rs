//! Big-endian bytes <-> decimal string conversion
//!
//! The proof service takes field inputs (extended public key, randomness,
//! salt) as base-10 integers. These helpers convert without pulling in a
//! bignum crate: the inputs are at most a few dozen bytes.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty decimal string")]
    Empty,

    #[error("invalid decimal digit {0:?}")]
    InvalidDigit(char),

    #[error("value does not fit in {0} bytes")]
    Overflow(usize),
}

/// Limb base for the intermediate little-endian accumulator (10^9 fits in u32).
const LIMB_BASE: u64 = 1_000_000_000;

/// Interpret `bytes` as a big-endian unsigned integer and render it in base 10.
///
/// Leading zero bytes do not change the value; an empty slice is `"0"`.
pub fn bytes_to_decimal(bytes: &[u8]) -> String {
    // little-endian base-1e9 limbs
    let mut limbs: Vec<u32> = vec![0];
    for &byte in bytes {
        let mut carry = byte as u64;
        for limb in limbs.iter_mut() {
            let acc = (*limb as u64) * 256 + carry;
            *limb = (acc % LIMB_BASE) as u32;
            carry = acc / LIMB_BASE;
        }
        while carry > 0 {
            limbs.push((carry % LIMB_BASE) as u32);
            carry /= LIMB_BASE;
        }
    }

    let mut out = String::with_capacity(limbs.len() * 9);
    let mut iter = limbs.iter().rev();
    if let Some(top) = iter.next() {
        out.push_str(&top.to_string());
    }
    for limb in iter {
        out.push_str(&format!("{limb:09}"));
    }
    out
}

/// Parse a base-10 unsigned integer into exactly `len` big-endian bytes,
/// left-padded with zeros.
///
/// Inverse of [`bytes_to_decimal`] for any byte string of length `len`.
pub fn decimal_to_bytes(s: &str, len: usize) -> Result<Vec<u8>, CodecError> {
    if s.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut out = vec![0u8; len];
    for ch in s.chars() {
        let digit = ch.to_digit(10).ok_or(CodecError::InvalidDigit(ch))?;
        let mut carry = digit;
        for byte in out.iter_mut().rev() {
            let acc = (*byte as u32) * 10 + carry;
            *byte = (acc & 0xFF) as u8;
            carry = acc >> 8;
        }
        if carry != 0 {
            return Err(CodecError::Overflow(len));
        }
    }
    Ok(out)
}

//! Register codec
//!
//! Pure conversions between raw 16-bit holding-register words and physical
//! values. Bytes inside a word are always big-endian; the order of the two
//! words of a 32-bit float is controller-specific and carried by
//! [`WordOrder`].

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Order in which the two words of a 32-bit value arrive from the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// First register holds the low-order 16 bits (CDAB). Used by the press controller.
    #[default]
    LowWordFirst,
    /// First register holds the high-order 16 bits (ABCD)
    HighWordFirst,
}

impl WordOrder {
    /// Split a register pair into `(high, low)`
    pub fn split(self, first: u16, second: u16) -> (u16, u16) {
        match self {
            WordOrder::LowWordFirst => (second, first),
            WordOrder::HighWordFirst => (first, second),
        }
    }

    /// Arrange `(high, low)` into wire order
    pub fn join(self, high: u16, low: u16) -> [u16; 2] {
        match self {
            WordOrder::LowWordFirst => [low, high],
            WordOrder::HighWordFirst => [high, low],
        }
    }
}

/// Interpretation of a single-register integer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntFormat {
    #[default]
    Uint16,
    Int16,
}

impl IntFormat {
    pub fn decode(self, word: u16) -> i32 {
        match self {
            IntFormat::Uint16 => decode_uint16(word),
            IntFormat::Int16 => decode_int16(word),
        }
    }

    pub fn encode(self, value: i32) -> Result<u16, CodecError> {
        match self {
            IntFormat::Uint16 => encode_uint16(value),
            IntFormat::Int16 => encode_int16(value),
        }
    }
}

/// Sign-extend a register
pub fn decode_int16(word: u16) -> i32 {
    i32::from(word as i16)
}

/// Zero-extend a register
pub fn decode_uint16(word: u16) -> i32 {
    i32::from(word)
}

pub fn encode_int16(value: i32) -> Result<u16, CodecError> {
    i16::try_from(value)
        .map(|v| v as u16)
        .map_err(|_| CodecError::OutOfRange {
            value: f64::from(value),
            format: "int16",
        })
}

pub fn encode_uint16(value: i32) -> Result<u16, CodecError> {
    u16::try_from(value).map_err(|_| CodecError::OutOfRange {
        value: f64::from(value),
        format: "uint16",
    })
}

/// Reassemble an IEEE-754 single from its high and low words
pub fn decode_float32(high: u16, low: u16) -> Result<f64, CodecError> {
    let bits = (u32::from(high) << 16) | u32::from(low);
    let value = f32::from_bits(bits);
    if !value.is_finite() {
        return Err(CodecError::NonFinite { low, high });
    }
    Ok(f64::from(value))
}

/// Decode a two-register float as read from the wire
pub fn decode_float32_words(words: &[u16], order: WordOrder) -> Result<f64, CodecError> {
    match words {
        [first, second] => {
            let (high, low) = order.split(*first, *second);
            decode_float32(high, low)
        },
        _ => Err(CodecError::WordCount {
            expected: 2,
            actual: words.len(),
        }),
    }
}

/// Split a value into `(high, low)` words of an IEEE-754 single
pub fn encode_float32(value: f64) -> Result<(u16, u16), CodecError> {
    let single = value as f32;
    if !value.is_finite() || !single.is_finite() {
        return Err(CodecError::OutOfRange {
            value,
            format: "float32",
        });
    }
    let bits = single.to_bits();
    Ok(((bits >> 16) as u16, (bits & 0xFFFF) as u16))
}

/// Encode a float into two registers in wire order
pub fn encode_float32_words(value: f64, order: WordOrder) -> Result<[u16; 2], CodecError> {
    let (high, low) = encode_float32(value)?;
    Ok(order.join(high, low))
}

/// Decode a single-register channel, checking the response length
pub fn decode_single(words: &[u16], format: IntFormat) -> Result<i32, CodecError> {
    match words {
        [word] => Ok(format.decode(*word)),
        _ => Err(CodecError::WordCount {
            expected: 1,
            actual: words.len(),
        }),
    }
}

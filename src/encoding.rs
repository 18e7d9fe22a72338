//! Software line codes applied to packet payloads.
//!
//! The client picks one [`Encoding`] with `SetSoftwareEncoding`; every later send encodes
//! its payload with it and every later receive decodes with it, until it is changed again.
//!
//! ## Codes
//!
//! - [`Identity`]: payload goes out unchanged.
//! - [`Manchester`]: each bit becomes a 2-bit symbol (`01` = one, `10` = zero), so every
//!   input byte becomes two output bytes. The first output byte carries bits 4..=7 of the
//!   source byte, the second carries bits 0..=3, lowest bit in the lowest symbol.
//! - [`FourBSixB`]: each nibble becomes a DC-balanced 6-bit code, packed MSB first.
//!   `n` bytes encode to `3 * (n / 2) + 2 * (n % 2)` bytes and `n` encoded bytes decode to
//!   `2 * (n / 3) + (n % 3) / 2` bytes.
//!
//! ## Truncation
//!
//! Decoders never fail. They stop at the first invalid symbol and return how many bytes
//! they produced; a short result is an implicitly truncated packet.
//!
//! ## Limitations
//!
//! - The 4b6b table below is the one used by Medtronic-compatible radios. It has not been
//!   verified against every pump family this bridge may talk to, which is why codecs sit
//!   behind the [`LineCodec`] trait.

use crate::error::CommandError;

/// Nibble to 6-bit code table for [`FourBSixB`].
pub const SYMBOLS: [u8; 16] = [
    0x15, 0x31, 0x32, 0x23, 0x34, 0x25, 0x26, 0x16, 0x1a, 0x19, 0x2a, 0x0b, 0x2c, 0x0d, 0x0e, 0x1c,
];

/// 6-bit code to nibble table, `None` for codes outside [`SYMBOLS`].
static REV_SYMBOLS: [Option<u8>; 64] = reverse_symbols();

const fn reverse_symbols() -> [Option<u8>; 64] {
    let mut table = [None; 64];
    let mut nibble = 0;
    while nibble < SYMBOLS.len() {
        table[SYMBOLS[nibble] as usize] = Some(nibble as u8);
        nibble += 1;
    }
    table
}

const MANCHESTER_ONE: u8 = 0b01;
const MANCHESTER_ZERO: u8 = 0b10;

/// A reversible byte-sequence transform.
pub trait LineCodec {
    /// Number of bytes `len` input bytes encode to.
    fn encoded_len(&self, len: usize) -> usize;

    /// Encodes `input` into `output`.
    ///
    /// Returns the number of bytes written, or `None` if `output` is shorter than
    /// [`encoded_len`](LineCodec::encoded_len).
    fn encode(&self, input: &[u8], output: &mut [u8]) -> Option<usize>;

    /// Decodes `input` into `output`, returning the number of bytes produced.
    ///
    /// Stops early at the first invalid symbol or when `output` is full.
    fn decode(&self, input: &[u8], output: &mut [u8]) -> usize;
}

/// Pass-through codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

/// Two-symbols-per-bit Manchester codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Manchester;

/// Nibble-to-6-bit codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FourBSixB;

impl LineCodec for Identity {
    fn encoded_len(&self, len: usize) -> usize {
        len
    }

    fn encode(&self, input: &[u8], output: &mut [u8]) -> Option<usize> {
        output.get_mut(..input.len())?.copy_from_slice(input);
        Some(input.len())
    }

    fn decode(&self, input: &[u8], output: &mut [u8]) -> usize {
        let len = input.len().min(output.len());
        output[..len].copy_from_slice(&input[..len]);
        len
    }
}

/// Encodes four bits starting at `first_bit` into one byte of Manchester symbols.
fn manchester_nibble(byte: u8, first_bit: u8) -> u8 {
    (0..4).fold(0, |acc, k| {
        let symbol = if (byte >> (first_bit + k)) & 0x01 != 0 {
            MANCHESTER_ONE
        } else {
            MANCHESTER_ZERO
        };
        acc | (symbol << (k * 2))
    })
}

/// Decodes one byte of Manchester symbols back into four bits.
fn manchester_unnibble(symbols: u8) -> Option<u8> {
    let mut bits = 0;
    for k in 0..4 {
        match (symbols >> (k * 2)) & 0x03 {
            MANCHESTER_ONE => bits |= 1 << k,
            MANCHESTER_ZERO => {}
            _ => return None,
        }
    }
    Some(bits)
}

impl LineCodec for Manchester {
    fn encoded_len(&self, len: usize) -> usize {
        len * 2
    }

    fn encode(&self, input: &[u8], output: &mut [u8]) -> Option<usize> {
        let output = output.get_mut(..self.encoded_len(input.len()))?;
        for (&byte, pair) in input.iter().zip(output.chunks_exact_mut(2)) {
            pair[0] = manchester_nibble(byte, 4);
            pair[1] = manchester_nibble(byte, 0);
        }
        Some(input.len() * 2)
    }

    fn decode(&self, input: &[u8], output: &mut [u8]) -> usize {
        let mut count = 0;
        for (pair, slot) in input.chunks_exact(2).zip(output.iter_mut()) {
            // low half first: a bad symbol anywhere in the byte discards the whole byte
            let Some(low) = manchester_unnibble(pair[1]) else {
                break;
            };
            let Some(high) = manchester_unnibble(pair[0]) else {
                break;
            };
            *slot = (high << 4) | low;
            count += 1;
        }
        count
    }
}

/// Encodes an 8-bit byte into two 6-bit symbols using 4b6b encoding.
pub fn encode_4b6b(byte: u8) -> [u8; 2] {
    [SYMBOLS[(byte >> 4) as usize], SYMBOLS[(byte & 0x0f) as usize]]
}

/// Decodes two 6-bit symbols back into the original byte using the reverse symbol table.
///
/// Returns `None` if either symbol is invalid (not part of the encoding table).
pub fn decode_6b4b(sym_hi: u8, sym_lo: u8) -> Option<u8> {
    let high = (*REV_SYMBOLS.get(sym_hi as usize)?)?;
    let low = (*REV_SYMBOLS.get(sym_lo as usize)?)?;
    Some((high << 4) | low)
}

impl LineCodec for FourBSixB {
    fn encoded_len(&self, len: usize) -> usize {
        3 * (len / 2) + 2 * (len % 2)
    }

    fn encode(&self, input: &[u8], output: &mut [u8]) -> Option<usize> {
        let len = self.encoded_len(input.len());
        let output = output.get_mut(..len)?;
        let mut o = 0;
        for pair in input.chunks(2) {
            let [a, b] = encode_4b6b(pair[0]);
            output[o] = (a << 2) | (b >> 4);
            match pair.get(1) {
                Some(&second) => {
                    let [c, d] = encode_4b6b(second);
                    output[o + 1] = ((b & 0x0f) << 4) | (c >> 2);
                    output[o + 2] = ((c & 0x03) << 6) | d;
                    o += 3;
                }
                None => {
                    // odd tail: pad the last code with zero bits
                    output[o + 1] = (b & 0x0f) << 4;
                    o += 2;
                }
            }
        }
        Some(o)
    }

    fn decode(&self, input: &[u8], output: &mut [u8]) -> usize {
        let mut acc: u32 = 0;
        let mut bits = 0;
        let mut count = 0;
        for &byte in input {
            acc = (acc << 8) | u32::from(byte);
            bits += 8;
            while bits >= 12 {
                bits -= 12;
                let codes = (acc >> bits) & 0x0fff;
                acc &= (1 << bits) - 1;
                let Some(slot) = output.get_mut(count) else {
                    return count;
                };
                match decode_6b4b((codes >> 6) as u8, (codes & 0x3f) as u8) {
                    Some(decoded) => *slot = decoded,
                    None => return count,
                }
                count += 1;
            }
        }
        count
    }
}

/// Software encoding selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Encoding {
    /// Payload is sent and returned as-is.
    #[default]
    None = 0,
    /// [`Manchester`] code.
    Manchester = 1,
    /// [`FourBSixB`] code.
    FourBSixB = 2,
}

impl Encoding {
    /// The codec implementing this encoding.
    pub fn codec(self) -> &'static dyn LineCodec {
        match self {
            Encoding::None => &Identity,
            Encoding::Manchester => &Manchester,
            Encoding::FourBSixB => &FourBSixB,
        }
    }
}

impl TryFrom<u8> for Encoding {
    type Error = CommandError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Encoding::None),
            1 => Ok(Encoding::Manchester),
            2 => Ok(Encoding::FourBSixB),
            other => Err(CommandError::InvalidEncoding(other)),
        }
    }
}

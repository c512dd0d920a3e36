use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// Bit order used everywhere: bit 0 of a block is the most significant bit
/// of its first byte, so a 16-bit word reads big-endian.
pub type Bits = BitVec<u8, Msb0>;
pub type BitsRef = BitSlice<u8, Msb0>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("bit range {start}..{end} is outside a {len}-bit store")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("invalid bit character {found:?} at position {index}")]
    InvalidBit { index: usize, found: char },
}

/// Parse a '0'/'1' string into bits. ASCII whitespace is skipped so that
/// program files with trailing newlines load unchanged.
pub fn parse_bits(text: &str) -> Result<Bits, MemoryError> {
    let mut bits = Bits::with_capacity(text.len());
    for (index, ch) in text.chars().enumerate() {
        match ch {
            '0' => bits.push(false),
            '1' => bits.push(true),
            c if c.is_ascii_whitespace() => {}
            found => return Err(MemoryError::InvalidBit { index, found }),
        }
    }
    Ok(bits)
}

/// Render bits as a '0'/'1' string.
pub fn bits_to_string(bits: &BitsRef) -> String {
    bits.iter().by_vals().map(|b| if b { '1' } else { '0' }).collect()
}

/// Fixed-size, bit-addressable storage. Every access is range-checked; the
/// capacity never changes after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct BitBlock {
    bits: Bits,
}

impl BitBlock {
    pub fn new(len_bits: usize) -> Self {
        Self {
            bits: bitvec![u8, Msb0; 0; len_bits],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    fn check(&self, start: usize, end: usize) -> Result<(), MemoryError> {
        if start > end || end > self.bits.len() {
            return Err(MemoryError::OutOfBounds {
                start,
                end,
                len: self.bits.len(),
            });
        }
        Ok(())
    }

    /// Half-open read of `start..end`.
    pub fn read(&self, start: usize, end: usize) -> Result<&BitsRef, MemoryError> {
        self.check(start, end)?;
        Ok(&self.bits[start..end])
    }

    pub fn write(&mut self, start: usize, bits: &BitsRef) -> Result<(), MemoryError> {
        let end = start + bits.len();
        self.check(start, end)?;
        self.bits[start..end].copy_from_bitslice(bits);
        Ok(())
    }

    pub fn read_u8(&self, addr: u16) -> Result<u8, MemoryError> {
        let start = addr as usize * 8;
        Ok(self.read(start, start + 8)?.load_be::<u8>())
    }

    pub fn read_word(&self, addr: u16) -> Result<u16, MemoryError> {
        let start = addr as usize * 8;
        Ok(self.read(start, start + 16)?.load_be::<u16>())
    }

    pub fn write_word(&mut self, addr: u16, val: u16) -> Result<(), MemoryError> {
        let start = addr as usize * 8;
        self.check(start, start + 16)?;
        self.bits[start..start + 16].store_be::<u16>(val);
        Ok(())
    }

    /// Hex rendering of `start..end`; the range must cover whole nibbles.
    pub fn hex(&self, start: usize, end: usize) -> Result<String, MemoryError> {
        let bits = self.read(start, end)?;
        Ok(bits
            .chunks(4)
            .map(|nibble| {
                let v = nibble.load_be::<u8>();
                char::from_digit(v as u32, 16).unwrap_or('?')
            })
            .collect())
    }

    pub fn as_bits(&self) -> &BitsRef {
        &self.bits
    }
}

impl fmt::Debug for BitBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBlock({} bits)", self.bits.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryArchitecture {
    #[default]
    Neumann,
    Harvard,
}

impl FromStr for MemoryArchitecture {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "neumann" => Ok(Self::Neumann),
            "harvard" => Ok(Self::Harvard),
            _ => Err(ConfigError::UnknownArchitecture(s.to_string())),
        }
    }
}

impl fmt::Display for MemoryArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neumann => "neumann",
            Self::Harvard => "harvard",
        })
    }
}

/// Program and data views over one (Neumann) or two (Harvard) stores.
#[derive(Debug, Clone)]
pub enum MemoryModel {
    Neumann(BitBlock),
    Harvard { program: BitBlock, data: BitBlock },
}

impl MemoryModel {
    pub fn new(arch: MemoryArchitecture, size_bytes: usize) -> Self {
        let bits = size_bytes * 8;
        match arch {
            MemoryArchitecture::Neumann => Self::Neumann(BitBlock::new(bits)),
            MemoryArchitecture::Harvard => Self::Harvard {
                program: BitBlock::new(bits),
                data: BitBlock::new(bits),
            },
        }
    }

    pub fn architecture(&self) -> MemoryArchitecture {
        match self {
            Self::Neumann(_) => MemoryArchitecture::Neumann,
            Self::Harvard { .. } => MemoryArchitecture::Harvard,
        }
    }

    pub fn program(&self) -> &BitBlock {
        match self {
            Self::Neumann(store) => store,
            Self::Harvard { program, .. } => program,
        }
    }

    pub fn program_mut(&mut self) -> &mut BitBlock {
        match self {
            Self::Neumann(store) => store,
            Self::Harvard { program, .. } => program,
        }
    }

    pub fn data(&self) -> &BitBlock {
        match self {
            Self::Neumann(store) => store,
            Self::Harvard { data, .. } => data,
        }
    }

    pub fn data_mut(&mut self) -> &mut BitBlock {
        match self {
            Self::Neumann(store) => store,
            Self::Harvard { data, .. } => data,
        }
    }

    /// Write a program image at a byte offset of the program store.
    pub fn load_program(&mut self, image: &BitsRef, start_byte: u16) -> Result<(), MemoryError> {
        self.program_mut().write(start_byte as usize * 8, image)
    }
}

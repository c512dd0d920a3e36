use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::isa::Isa;
use crate::memory::Bits;
use crate::ConfigError;
use bitvec::prelude::*;

/// Highest general purpose register index any profile provides (R00..R07).
pub const MAX_GPRS: u8 = 8;
const SLOTS: usize = 7 + MAX_GPRS as usize;

/// Register names, resolved from strings only at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Reg {
    Ip,
    Sp,
    Fr,
    Bp,
    Tos,
    Acc,
    Ir,
    R(u8),
}

impl Reg {
    fn slot(self) -> usize {
        match self {
            Reg::Ip => 0,
            Reg::Sp => 1,
            Reg::Fr => 2,
            Reg::Bp => 3,
            Reg::Tos => 4,
            Reg::Acc => 5,
            Reg::Ir => 6,
            Reg::R(n) => 7 + n as usize,
        }
    }

    fn from_slot(slot: usize) -> Reg {
        match slot {
            0 => Reg::Ip,
            1 => Reg::Sp,
            2 => Reg::Fr,
            3 => Reg::Bp,
            4 => Reg::Tos,
            5 => Reg::Acc,
            6 => Reg::Ir,
            n => Reg::R((n - 7) as u8),
        }
    }

    pub fn name(self) -> String {
        match self {
            Reg::Ip => "IP".into(),
            Reg::Sp => "SP".into(),
            Reg::Fr => "FR".into(),
            Reg::Bp => "BP".into(),
            Reg::Tos => "TOS".into(),
            Reg::Acc => "ACC".into(),
            Reg::Ir => "IR".into(),
            Reg::R(n) => format!("R{n:02}"),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Reg {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let up = s.to_ascii_uppercase();
        Ok(match up.as_str() {
            "IP" => Reg::Ip,
            "SP" => Reg::Sp,
            "FR" => Reg::Fr,
            "BP" => Reg::Bp,
            "TOS" => Reg::Tos,
            "ACC" => Reg::Acc,
            "IR" => Reg::Ir,
            _ => {
                let n = up
                    .strip_prefix('R')
                    .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
                    .and_then(|d| d.parse::<u8>().ok())
                    .filter(|n| *n < MAX_GPRS)
                    .ok_or_else(|| ConfigError::UnknownRegister(s.to_string()))?;
                Reg::R(n)
            }
        })
    }
}

/// Named register-set preset. The profile decides how many general purpose
/// registers the register-based ISAs get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegisterProfile {
    #[default]
    Special,
    Extended,
}

impl RegisterProfile {
    fn gprs(self) -> u8 {
        match self {
            RegisterProfile::Special => 4,
            RegisterProfile::Extended => MAX_GPRS,
        }
    }
}

impl FromStr for RegisterProfile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "special" => Ok(Self::Special),
            "extended" => Ok(Self::Extended),
            _ => Err(ConfigError::UnknownProfile(s.to_string())),
        }
    }
}

impl fmt::Display for RegisterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Special => "special",
            Self::Extended => "extended",
        })
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags: u16 {
const LESS = 1 << 0;
const GREATER = 1 << 1;
const EQUAL = 1 << 2;
const ZERO = 1 << 3;
}
}

impl Flags {
    pub fn compare_signed(a: u16, b: u16) -> Flags {
        Self::ordering((a as i16).cmp(&(b as i16)))
    }

    pub fn compare_unsigned(a: u16, b: u16) -> Flags {
        Self::ordering(a.cmp(&b))
    }

    /// Flags of `a & b` compared (signed) against zero.
    pub fn test(a: u16, b: u16) -> Flags {
        Self::compare_signed(a & b, 0)
    }

    fn ordering(ord: std::cmp::Ordering) -> Flags {
        match ord {
            std::cmp::Ordering::Less => Flags::LESS,
            std::cmp::Ordering::Greater => Flags::GREATER,
            std::cmp::Ordering::Equal => Flags::EQUAL | Flags::ZERO,
        }
    }
}

/// Fixed-width 16-bit register file. Which slots exist is decided once from
/// the ISA and profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    values: [u16; SLOTS],
    present: [bool; SLOTS],
}

impl Registers {
    pub fn new(isa: Isa, profile: RegisterProfile) -> Self {
        let mut present = [false; SLOTS];
        let mut mark = |r: Reg| present[r.slot()] = true;
        mark(Reg::Ip);
        mark(Reg::Sp);
        mark(Reg::Fr);
        match isa {
            Isa::Stack => mark(Reg::Tos),
            Isa::Accumulator => {
                mark(Reg::Acc);
                mark(Reg::Ir);
            }
            Isa::Risc => (0..profile.gprs()).for_each(|n| mark(Reg::R(n))),
            Isa::Cisc => {
                mark(Reg::Bp);
                (0..profile.gprs()).for_each(|n| mark(Reg::R(n)));
            }
        }
        Self {
            values: [0; SLOTS],
            present,
        }
    }

    pub fn has(&self, reg: Reg) -> bool {
        let slot = reg.slot();
        slot < SLOTS && self.present[slot]
    }

    pub fn get(&self, reg: Reg) -> Option<u16> {
        self.has(reg).then(|| self.values[reg.slot()])
    }

    /// Returns false (and changes nothing) when the register is not part of
    /// this file.
    pub fn set(&mut self, reg: Reg, val: u16) -> bool {
        if !self.has(reg) {
            return false;
        }
        self.values[reg.slot()] = val;
        true
    }

    pub fn as_unsigned(&self, reg: Reg) -> Option<u16> {
        self.get(reg)
    }

    pub fn as_signed(&self, reg: Reg) -> Option<i16> {
        self.get(reg).map(|v| v as i16)
    }

    /// Raw 16-bit pattern of a register looked up by name (`"IP"`, `"R00"`).
    pub fn bits(&self, name: &str) -> Option<Bits> {
        let reg = name.parse::<Reg>().ok()?;
        let val = self.get(reg)?;
        let mut bits = bitvec![u8, Msb0; 0; 16];
        bits.store_be::<u16>(val);
        Some(bits)
    }

    pub fn by_name(&self, name: &str) -> Option<u16> {
        self.get(name.parse::<Reg>().ok()?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Reg, u16)> + '_ {
        (0..SLOTS)
            .filter(|s| self.present[*s])
            .map(|s| (Reg::from_slot(s), self.values[s]))
    }

    // The registers every ISA has, so these never miss.
    pub fn ip(&self) -> u16 {
        self.values[Reg::Ip.slot()]
    }

    pub fn set_ip(&mut self, v: u16) {
        self.values[Reg::Ip.slot()] = v;
    }

    pub fn sp(&self) -> u16 {
        self.values[Reg::Sp.slot()]
    }

    pub fn set_sp(&mut self, v: u16) {
        self.values[Reg::Sp.slot()] = v;
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_retain(self.values[Reg::Fr.slot()])
    }

    pub fn set_flags(&mut self, f: Flags) {
        self.values[Reg::Fr.slot()] = f.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for name in ["IP", "SP", "FR", "BP", "TOS", "ACC", "IR", "R00", "R07"] {
            assert_eq!(name.parse::<Reg>().unwrap().name(), name);
        }
        assert_eq!("r3".parse::<Reg>().unwrap(), Reg::R(3));
        assert!("R08".parse::<Reg>().is_err());
        assert!("XX".parse::<Reg>().is_err());
    }

    #[test]
    fn profile_controls_gpr_count() {
        let special = Registers::new(Isa::Risc, RegisterProfile::Special);
        assert!(special.has(Reg::R(3)));
        assert!(!special.has(Reg::R(4)));
        assert!(!special.has(Reg::Bp));
        let extended = Registers::new(Isa::Cisc, RegisterProfile::Extended);
        assert!(extended.has(Reg::R(7)));
        assert!(extended.has(Reg::Bp));
        let stack = Registers::new(Isa::Stack, RegisterProfile::Extended);
        let names: Vec<String> = stack.iter().map(|(r, _)| r.name()).collect();
        assert_eq!(names, ["IP", "SP", "FR", "TOS"]);
    }

    #[test]
    fn signed_and_unsigned_views_share_bits() {
        let mut regs = Registers::new(Isa::Accumulator, RegisterProfile::Special);
        assert!(regs.set(Reg::Acc, 0xFFFF));
        assert_eq!(regs.as_unsigned(Reg::Acc), Some(0xFFFF));
        assert_eq!(regs.as_signed(Reg::Acc), Some(-1));
        assert!(!regs.set(Reg::Tos, 1));
        let bits = regs.bits("ACC").unwrap();
        assert!(bits.all());
    }

    #[test]
    fn signed_and_unsigned_compare_disagree_on_top_bit() {
        assert_eq!(Flags::compare_unsigned(5, 0xFFFF), Flags::LESS);
        assert_eq!(Flags::compare_signed(5, 0xFFFF), Flags::GREATER);
        assert_eq!(Flags::compare_signed(7, 7), Flags::EQUAL | Flags::ZERO);
        assert_eq!(Flags::test(0b1010, 0b0101), Flags::EQUAL | Flags::ZERO);
        assert_eq!(Flags::test(0x8000, 0xFFFF), Flags::LESS);
    }
}

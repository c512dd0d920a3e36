use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::registers::Reg;

/// Width, in characters, of every output port's rolling display.
pub const DISPLAY_WIDTH: usize = 20;

/// Left-truncating window over the most recent `DISPLAY_WIDTH` characters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollingDisplay {
    chars: VecDeque<char>,
}

impl RollingDisplay {
    pub fn push(&mut self, ch: char) {
        if self.chars.len() == DISPLAY_WIDTH {
            self.chars.pop_front();
        }
        self.chars.push_back(ch);
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl fmt::Display for RollingDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in self.chars.len()..DISPLAY_WIDTH {
            f.write_str(" ")?;
        }
        for ch in &self.chars {
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

/// Where a completed input value lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Destination {
    Register(Reg),
    Memory(u16),
    /// Pushed on the stack machine's operand stack.
    OperandStack,
}

impl Destination {
    /// Destination of the next word of a multi-word transfer.
    pub fn next(self) -> Destination {
        match self {
            Destination::Register(Reg::R(n)) => Destination::Register(Reg::R(n + 1)),
            Destination::Memory(addr) => Destination::Memory(addr.wrapping_add(2)),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingInput {
    pub dest: Destination,
    /// Words still to be supplied before the instruction completes.
    pub remaining: u8,
    /// Encoded width of the `in` instruction, applied to IP on completion.
    pub width: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputState {
    #[default]
    Idle,
    AwaitingValue(PendingInput),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Port {
    pub display: RollingDisplay,
    pub input: InputState,
}

impl Port {
    /// Narrow to the low byte and append it as a character.
    pub fn write(&mut self, val: u16) {
        self.display.push((val & 0xFF) as u8 as char);
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display.fmt(f)
    }
}

/// Ports keyed by their decimal number, created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortBank {
    ports: BTreeMap<String, Port>,
}

impl PortBank {
    pub fn get(&self, key: &str) -> Option<&Port> {
        self.ports.get(key)
    }

    pub fn port_mut(&mut self, number: u16) -> &mut Port {
        self.ports.entry(number.to_string()).or_default()
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Port> {
        self.ports.get_mut(key)
    }

    /// Rendered output of a port; an unused port renders blank.
    pub fn render(&self, key: &str) -> String {
        self.get(key)
            .map(|p| p.to_string())
            .unwrap_or_else(|| RollingDisplay::default().to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Port)> {
        self.ports.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_pads_left_then_rolls() {
        let mut port = Port::default();
        for ch in 'A'..='F' {
            port.write(ch as u16);
        }
        assert_eq!(port.to_string(), "              ABCDEF");
        for ch in 'G'..='Z' {
            port.write(ch as u16);
        }
        assert_eq!(port.to_string(), "GHIJKLMNOPQRSTUVWXYZ");
        assert_eq!(port.to_string().len(), DISPLAY_WIDTH);
    }

    #[test]
    fn write_keeps_only_the_low_byte() {
        let mut port = Port::default();
        port.write(0x4145);
        assert_eq!(port.to_string().trim_start(), "E");
    }

    #[test]
    fn unused_port_renders_blank() {
        let bank = PortBank::default();
        assert_eq!(bank.render("7"), " ".repeat(DISPLAY_WIDTH));
    }

    #[test]
    fn multi_word_destinations_advance() {
        assert_eq!(
            Destination::Register(Reg::R(1)).next(),
            Destination::Register(Reg::R(2))
        );
        assert_eq!(Destination::Memory(0x100).next(), Destination::Memory(0x102));
        assert_eq!(Destination::OperandStack.next(), Destination::OperandStack);
    }
}

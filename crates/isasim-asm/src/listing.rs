use std::collections::BTreeMap;
use std::fmt::Write as _;

use isasim::assembler::ListingLine;
use isasim::disasm::Line;

/// Exported symbol, one per label.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabelKV {
    pub addr: u16,
    pub name: String,
}

pub fn labels(symbols: &BTreeMap<String, u16>) -> Vec<LabelKV> {
    let mut out: Vec<LabelKV> = symbols
        .iter()
        .map(|(name, addr)| LabelKV { addr: *addr, name: name.clone() })
        .collect();
    out.sort_by(|a, b| a.addr.cmp(&b.addr).then_with(|| a.name.cmp(&b.name)));
    out
}

/// `addr: bits    source`, with labels on their own line.
pub fn render_listing(lines: &[ListingLine], symbols: &BTreeMap<String, u16>, show_bits: bool) -> String {
    let mut by_addr: BTreeMap<u16, Vec<&str>> = BTreeMap::new();
    for (name, addr) in symbols {
        by_addr.entry(*addr).or_default().push(name);
    }
    let mut buf = String::new();
    for l in lines {
        if let Some(names) = by_addr.remove(&l.addr) {
            for name in names {
                let _ = writeln!(buf, "{name}:");
            }
        }
        // The source already carries the label; keep only the statement.
        let stmt = match l.source.split_once(':') {
            Some((label, rest)) if symbols.contains_key(label.trim()) => rest.trim(),
            _ => l.source.as_str(),
        };
        if show_bits {
            let _ = writeln!(buf, "{:#06x}: {:<32} {stmt}", l.addr, l.bits);
        } else {
            let _ = writeln!(buf, "{:#06x}: {stmt}", l.addr);
        }
    }
    // Labels past the last statement.
    for (addr, names) in by_addr {
        for name in names {
            let _ = writeln!(buf, "{name}:  ; {addr:#06x}");
        }
    }
    buf
}

pub fn render_disasm(lines: &[Line], show_bits: bool) -> String {
    let mut buf = String::new();
    for l in lines {
        if show_bits {
            let _ = writeln!(buf, "{:#06x}: {:<48} {}", l.addr, l.bits, l.text);
        } else {
            let _ = writeln!(buf, "{:#06x}: {}", l.addr, l.text);
        }
    }
    buf
}

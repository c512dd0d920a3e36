//! Operand and literal syntax.

use crate::instructions::OperandKinds;
use crate::registers::Reg;

use super::lexer::is_identifier;
use super::AsmErrorKind;

/// A number or a label whose address is known only after pass 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Reg(Reg),
    Imm(Value),
    Mem(Reg),
    Indexed { base: Reg, disp: Value },
    /// `%R02+$6` without brackets: a register-relative branch target.
    Offset { base: Reg, disp: Value },
}

impl Arg {
    pub fn kind(&self) -> OperandKinds {
        match self {
            Arg::Reg(_) => OperandKinds::REG,
            Arg::Imm(_) => OperandKinds::IMM,
            Arg::Mem(_) => OperandKinds::MEM,
            Arg::Indexed { .. } | Arg::Offset { .. } => OperandKinds::INDEXED,
        }
    }
}

fn malformed(text: &str, why: &str) -> AsmErrorKind {
    AsmErrorKind::MalformedOperand(format!("`{text}`: {why}"))
}

/// Decode backslash escapes inside a string or char literal body.
pub fn unescape(body: &str) -> Result<Vec<char>, AsmErrorKind> {
    let mut out = Vec::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        out.push(match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('0') => '\0',
            Some(c @ ('\\' | '\'' | '"')) => c,
            Some(c) => return Err(malformed(body, &format!("unknown escape `\\{c}`"))),
            None => return Err(malformed(body, "dangling backslash")),
        });
    }
    Ok(out)
}

/// Contents of a `"..."` literal.
pub fn parse_string(text: &str) -> Result<Vec<char>, AsmErrorKind> {
    let body = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| text.len() >= 2)
        .ok_or_else(|| malformed(text, "expected a double-quoted string"))?;
    unescape(body)
}

fn parse_char(text: &str) -> Result<i64, AsmErrorKind> {
    let body = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
        .filter(|_| text.len() >= 3)
        .ok_or_else(|| malformed(text, "bad character literal"))?;
    match unescape(body)?.as_slice() {
        [c] => Ok(*c as i64),
        _ => Err(malformed(text, "character literal must hold one character")),
    }
}

/// Decimal, `0x` hex, `0b` binary or `'c'`, with an optional leading `-`.
pub fn parse_number(text: &str) -> Result<i64, AsmErrorKind> {
    if text.starts_with('\'') {
        return parse_char(text);
    }
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let lower = digits.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };
    let n = parsed.map_err(|_| malformed(text, "not a number"))?;
    Ok(if neg { -n } else { n })
}

/// `$n`, `$label`, a bare label, or (when `bare_numbers`) a bare number.
pub fn parse_value(text: &str, bare_numbers: bool) -> Result<Value, AsmErrorKind> {
    let (dollar, body) = match text.strip_prefix('$') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, text),
    };
    if is_identifier(body) {
        return Ok(Value::Label(body.to_string()));
    }
    if !dollar && !bare_numbers {
        return Err(malformed(text, "immediates are written `$n`"));
    }
    parse_number(body).map(Value::Number)
}

fn parse_register(text: &str) -> Result<Reg, AsmErrorKind> {
    let name = text
        .strip_prefix('%')
        .ok_or_else(|| malformed(text, "registers are written `%NAME`"))?;
    name.parse().map_err(|_| AsmErrorKind::UnknownRegister(name.to_string()))
}

/// `%REG`, `%REG+disp` or `%REG-disp`.
fn parse_based(text: &str) -> Result<(Reg, Option<Value>), AsmErrorKind> {
    let Some(at) = text.find(['+', '-']) else {
        return Ok((parse_register(text.trim())?, None));
    };
    let base = parse_register(text[..at].trim())?;
    let negate = text[at..].starts_with('-');
    let rest = text[at + 1..].trim();
    let disp = match parse_value(rest, true)? {
        Value::Number(n) if negate => Value::Number(-n),
        Value::Label(name) if negate => {
            return Err(malformed(text, &format!("label `{name}` cannot be subtracted")))
        }
        v => v,
    };
    Ok((base, Some(disp)))
}

pub fn parse_operand(text: &str) -> Result<Arg, AsmErrorKind> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or_else(|| malformed(text, "missing `]`"))?
            .trim();
        return Ok(match parse_based(inner)? {
            (base, None) => Arg::Mem(base),
            (base, Some(disp)) => Arg::Indexed { base, disp },
        });
    }
    if text.starts_with('%') {
        return Ok(match parse_based(text)? {
            (reg, None) => Arg::Reg(reg),
            (base, Some(disp)) => Arg::Offset { base, disp },
        });
    }
    parse_value(text, false).map(Arg::Imm)
}

//! Two-pass assembler. Pass 1 sizes every statement and records labels;
//! pass 2 resolves label operands and emits bits through the same per-ISA
//! encoders the decoder tests round-trip against.

mod lexer;
mod operand;

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::decoder::{Decoded, EncodeError, Operand};
use crate::instructions::{by_mnemonic, InstrDesc, OperandKinds};
use crate::isa::{accumulator, cisc, push_bits, risc, stack, Isa};
use crate::memory::{bits_to_string, Bits};
use crate::registers::Reg;

use lexer::{parse_line, Body};
use operand::{parse_number, parse_operand, parse_string, parse_value, Arg, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("unknown register `%{0}`")]
    UnknownRegister(String),
    #[error("malformed operand {0}")]
    MalformedOperand(String),
    #[error("`{mnemonic}` takes {expected} operand(s), found {found}")]
    Arity { mnemonic: String, expected: String, found: usize },
    #[error("`{mnemonic}` operand {index} must be {expected}")]
    OperandMismatch { mnemonic: String, index: usize, expected: String },
    #[error("value {value} out of range {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("displacement {value} is not a multiple of {unit}")]
    Misaligned { value: i64, unit: u16 },
    #[error("register %{0} cannot be used here")]
    Register(Reg),
    #[error("label `{0}` is already defined")]
    DuplicateLabel(String),
    #[error("undefined label `{0}`")]
    UndefinedLabel(String),
    #[error("{0}")]
    BadDirective(String),
    #[error("program runs past address 0xFFFF")]
    TooLarge,
}

/// An assembly failure, pinned to the offending line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind}\n    {text}")]
pub struct AsmError {
    pub line: usize,
    pub text: String,
    pub kind: AsmErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingLine {
    pub line: usize,
    pub addr: u16,
    pub bits: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub isa: Isa,
    pub origin: u16,
    pub bits: Bits,
    pub symbols: BTreeMap<String, u16>,
    pub listing: Vec<ListingLine>,
}

impl Program {
    /// The image as '0'/'1' text, which is also the on-disk binary format.
    pub fn binary_code(&self) -> String {
        bits_to_string(&self.bits)
    }

    pub fn len_bytes(&self) -> usize {
        self.bits.len() / 8
    }
}

enum Datum {
    Byte(Value),
    Word(Value),
    Zero(usize),
}

impl Datum {
    fn width(&self) -> usize {
        match self {
            Datum::Byte(_) => 1,
            Datum::Word(_) => 2,
            Datum::Zero(n) => *n,
        }
    }
}

enum Item<O: 'static> {
    Code { desc: &'static InstrDesc<O>, args: Vec<Arg>, width: u16 },
    Data(Vec<Datum>),
}

struct Placed<'s, O: 'static> {
    line: usize,
    text: &'s str,
    addr: u16,
    item: Item<O>,
}

type Encoder<O> = fn(&Decoded<O>) -> Result<Bits, EncodeError>;

#[derive(Debug, Clone, Copy)]
pub struct Assembler {
    isa: Isa,
    origin: u16,
}

pub fn assemble(isa: Isa, source: &str) -> Result<Program, AsmError> {
    Assembler::new(isa).assemble(source)
}

impl Assembler {
    pub fn new(isa: Isa) -> Self {
        Self { isa, origin: 0 }
    }

    /// Address the image will be loaded at; label values include it.
    pub fn with_origin(mut self, origin: u16) -> Self {
        self.origin = origin;
        self
    }

    pub fn assemble(&self, source: &str) -> Result<Program, AsmError> {
        match self.isa {
            Isa::Stack => self.run(stack::TABLE, stack::encode, source),
            Isa::Accumulator => self.run(accumulator::TABLE, accumulator::encode, source),
            Isa::Risc => self.run(risc::TABLE, risc::encode, source),
            Isa::Cisc => self.run(cisc::TABLE, cisc::encode, source),
        }
    }

    fn run<O: Copy + PartialEq>(
        &self,
        table: &'static [InstrDesc<O>],
        encode: Encoder<O>,
        source: &str,
    ) -> Result<Program, AsmError> {
        let (items, symbols) = self.first_pass(table, source)?;
        let unit = self.isa.displacement_unit() as i64;

        let mut bits = Bits::new();
        let mut listing = Vec::with_capacity(items.len());
        for placed in &items {
            let at = |kind: AsmErrorKind| AsmError {
                line: placed.line,
                text: placed.text.trim().to_string(),
                kind,
            };
            let chunk = match &placed.item {
                Item::Code { desc, args, width } => {
                    let operands = args
                        .iter()
                        .map(|a| lower(a, desc.branch, unit, placed.addr, &symbols))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(at)?;
                    let decoded = Decoded { op: desc.op, operands, width: *width };
                    let chunk = encode(&decoded).map_err(|e| at(encode_error(desc, e)))?;
                    debug_assert_eq!(chunk.len(), *width as usize * 8);
                    chunk
                }
                Item::Data(data) => emit_data(data, &symbols).map_err(at)?,
            };
            listing.push(ListingLine {
                line: placed.line,
                addr: placed.addr,
                bits: bits_to_string(&chunk),
                source: placed.text.trim().to_string(),
            });
            bits.extend_from_bitslice(&chunk);
        }

        debug!(
            isa = %self.isa,
            bytes = bits.len() / 8,
            statements = listing.len(),
            labels = symbols.len(),
            "assembled program"
        );
        Ok(Program {
            isa: self.isa,
            origin: self.origin,
            bits,
            symbols,
            listing,
        })
    }

    #[allow(clippy::type_complexity)]
    fn first_pass<'s, O: Copy + PartialEq>(
        &self,
        table: &'static [InstrDesc<O>],
        source: &'s str,
    ) -> Result<(Vec<Placed<'s, O>>, BTreeMap<String, u16>), AsmError> {
        let mut symbols = BTreeMap::new();
        let mut items = Vec::new();
        let mut offset = 0usize;

        for (idx, text) in source.lines().enumerate() {
            let line = idx + 1;
            let at = |kind: AsmErrorKind| AsmError {
                line,
                text: text.trim().to_string(),
                kind,
            };
            let addr = self.address(offset).ok_or_else(|| at(AsmErrorKind::TooLarge))?;
            let stmt = parse_line(text).map_err(at)?;

            if let Some(name) = stmt.label {
                if symbols.insert(name.to_string(), addr).is_some() {
                    return Err(at(AsmErrorKind::DuplicateLabel(name.to_string())));
                }
            }
            let item = match stmt.body {
                None => continue,
                Some(Body::Instruction { mnemonic, operands }) => {
                    self.instruction(table, mnemonic, &operands).map_err(at)?
                }
                Some(Body::Directive { name, args }) => Item::Data(directive(name, &args).map_err(at)?),
            };
            offset += match &item {
                Item::Code { width, .. } => *width as usize,
                Item::Data(data) => data.iter().map(Datum::width).sum(),
            };
            if offset > 0 && self.address(offset - 1).is_none() {
                return Err(at(AsmErrorKind::TooLarge));
            }
            items.push(Placed { line, text, addr, item });
        }
        Ok((items, symbols))
    }

    fn address(&self, offset: usize) -> Option<u16> {
        u16::try_from(self.origin as usize + offset).ok()
    }

    fn instruction<O: Copy + PartialEq>(
        &self,
        table: &'static [InstrDesc<O>],
        mnemonic: &str,
        operands: &[&str],
    ) -> Result<Item<O>, AsmErrorKind> {
        let desc = by_mnemonic(table, mnemonic)
            .ok_or_else(|| AsmErrorKind::UnknownMnemonic(mnemonic.to_string()))?;
        let mut args = operands
            .iter()
            .map(|o| parse_operand(o))
            .collect::<Result<Vec<_>, _>>()?;
        // `[%IR]` is the accumulator machine's implicit operand.
        if self.isa == Isa::Accumulator && args == [Arg::Mem(Reg::Ir)] {
            args.clear();
        }
        if !desc.branch {
            if let Some(Arg::Offset { base, .. }) = args.iter().find(|a| matches!(a, Arg::Offset { .. })) {
                return Err(AsmErrorKind::MalformedOperand(format!(
                    "`%{base}+...` is only a branch target; write `[%{base}+...]` for memory"
                )));
            }
        }
        let kinds: Vec<OperandKinds> = args.iter().map(Arg::kind).collect();
        check_shape(desc, &kinds)?;
        let width = self.isa.instruction_width(&kinds);
        Ok(Item::Code { desc, args, width })
    }
}

fn check_shape<O>(desc: &InstrDesc<O>, kinds: &[OperandKinds]) -> Result<(), AsmErrorKind> {
    if desc.accepts(kinds) {
        return Ok(());
    }
    let arities = desc.arities();
    if !arities.contains(&kinds.len()) {
        let expected: Vec<String> = arities.iter().map(|n| n.to_string()).collect();
        return Err(AsmErrorKind::Arity {
            mnemonic: desc.mnemonic.to_string(),
            expected: expected.join(" or "),
            found: kinds.len(),
        });
    }
    let same_len = desc.shapes.iter().filter(|s| s.len() == kinds.len());
    for (index, kind) in kinds.iter().enumerate() {
        let allowed = same_len
            .clone()
            .fold(OperandKinds::empty(), |acc, s| acc | s[index]);
        if !allowed.contains(*kind) {
            return Err(AsmErrorKind::OperandMismatch {
                mnemonic: desc.mnemonic.to_string(),
                index: index + 1,
                expected: allowed.describe(),
            });
        }
    }
    // Each operand is allowed on its own but not in this combination.
    Err(AsmErrorKind::OperandMismatch {
        mnemonic: desc.mnemonic.to_string(),
        index: kinds.len(),
        expected: "a different operand combination".to_string(),
    })
}

fn directive(name: &str, args: &[&str]) -> Result<Vec<Datum>, AsmErrorKind> {
    if args.is_empty() {
        return Err(AsmErrorKind::BadDirective(format!("`{name}` needs an argument")));
    }
    let mut out = Vec::new();
    match name.to_ascii_lowercase().as_str() {
        ".byte" => {
            for a in args {
                out.push(Datum::Byte(parse_value(a, true)?));
            }
        }
        ".word" => {
            for a in args {
                out.push(Datum::Word(parse_value(a, true)?));
            }
        }
        ".ascii" | ".string" => {
            let wide = name.eq_ignore_ascii_case(".string");
            for a in args {
                for c in parse_string(a)? {
                    let v = Value::Number(c as i64);
                    out.push(if wide { Datum::Word(v) } else { Datum::Byte(v) });
                }
            }
        }
        ".zero" => {
            let [count] = args else {
                return Err(AsmErrorKind::BadDirective("`.zero` takes one count".to_string()));
            };
            let n = parse_number(count.trim_start_matches('$'))?;
            let n = usize::try_from(n).map_err(|_| AsmErrorKind::OutOfRange {
                value: n,
                min: 0,
                max: u16::MAX as i64,
            })?;
            out.push(Datum::Zero(n));
        }
        _ => return Err(AsmErrorKind::BadDirective(format!("unknown directive `{name}`"))),
    }
    Ok(out)
}

fn resolve(v: &Value, symbols: &BTreeMap<String, u16>) -> Result<i64, AsmErrorKind> {
    match v {
        Value::Number(n) => Ok(*n),
        Value::Label(name) => symbols
            .get(name)
            .map(|a| *a as i64)
            .ok_or_else(|| AsmErrorKind::UndefinedLabel(name.clone())),
    }
}

fn in_range(value: i64, min: i64, max: i64) -> Result<i64, AsmErrorKind> {
    if value < min || value > max {
        return Err(AsmErrorKind::OutOfRange { value, min, max });
    }
    Ok(value)
}

/// A 16-bit pattern from either a signed or an unsigned literal.
fn word(value: i64) -> Result<u16, AsmErrorKind> {
    in_range(value, i16::MIN as i64, u16::MAX as i64).map(|v| v as u16)
}

/// `unit` is the size in bytes of one step of a numeric branch displacement.
fn lower(
    arg: &Arg,
    branch: bool,
    unit: i64,
    here: u16,
    symbols: &BTreeMap<String, u16>,
) -> Result<Operand, AsmErrorKind> {
    Ok(match arg {
        Arg::Reg(r) => Operand::Reg(*r),
        Arg::Mem(r) => Operand::Mem(*r),
        // Branch labels become displacements from the branch itself.
        Arg::Imm(label @ Value::Label(_)) if branch => {
            let target = resolve(label, symbols)? as u16;
            Operand::Imm(target.wrapping_sub(here))
        }
        Arg::Imm(Value::Number(n)) if branch => {
            let steps = in_range(*n, i16::MIN as i64, u16::MAX as i64)?;
            Operand::Imm(word(steps * unit)?)
        }
        Arg::Imm(v) => Operand::Imm(word(resolve(v, symbols)?)?),
        Arg::Indexed { base, disp } | Arg::Offset { base, disp } => {
            let d = in_range(resolve(disp, symbols)?, i16::MIN as i64, i16::MAX as i64)?;
            Operand::Indexed { base: *base, disp: d as i16 }
        }
    })
}

fn emit_data(data: &[Datum], symbols: &BTreeMap<String, u16>) -> Result<Bits, AsmErrorKind> {
    let mut out = Bits::new();
    for datum in data {
        match datum {
            Datum::Byte(v) => {
                let b = in_range(resolve(v, symbols)?, i8::MIN as i64, u8::MAX as i64)?;
                push_bits(&mut out, (b as u8) as u32, 8);
            }
            Datum::Word(v) => push_bits(&mut out, word(resolve(v, symbols)?)? as u32, 16),
            Datum::Zero(n) => out.resize(out.len() + n * 8, false),
        }
    }
    Ok(out)
}

fn encode_error<O>(desc: &InstrDesc<O>, e: EncodeError) -> AsmErrorKind {
    match e {
        EncodeError::OutOfRange { value, min, max, .. } => AsmErrorKind::OutOfRange { value, min, max },
        EncodeError::Misaligned { value, unit } => AsmErrorKind::Misaligned { value, unit },
        EncodeError::Register(r) => AsmErrorKind::Register(r),
        EncodeError::Shape { index } => AsmErrorKind::OperandMismatch {
            mnemonic: desc.mnemonic.to_string(),
            index: index + 1,
            expected: "an encodable operand".to_string(),
        },
    }
}

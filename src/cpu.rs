use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decoder::{DecodeError, Decoder};
use crate::disasm;
use crate::exec::{
    AccumulatorExecutor, CiscExecutor, Executor, Flow, RiscExecutor, StackExecutor,
};
use crate::isa::accumulator::AccumulatorDecoder;
use crate::isa::cisc::CiscDecoder;
use crate::isa::risc::RiscDecoder;
use crate::isa::stack::StackDecoder;
use crate::isa::Isa;
use crate::machine::Machine;
use crate::memory::{
    bits_to_string, parse_bits, BitBlock, Bits, BitsRef, MemoryArchitecture, MemoryError,
    MemoryModel,
};
use crate::ports::{InputState, PendingInput, PortBank};
use crate::registers::{Reg, RegisterProfile, Registers};
use crate::ConfigError;

pub const DEFAULT_MEMORY_SIZE: u16 = 1024;
pub const MIN_MEMORY_SIZE: u16 = 16;
pub const MAX_MEMORY_SIZE: u16 = 32768;
/// Input values are at most one machine word.
pub const WORD_BITS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    pub isa: Isa,
    pub memory: MemoryArchitecture,
    pub profile: RegisterProfile,
    /// Byte offset the program image is loaded at; also the initial IP.
    pub program_start: u16,
    /// Bytes per store.
    pub memory_size: u16,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            isa: Isa::default(),
            memory: MemoryArchitecture::default(),
            profile: RegisterProfile::default(),
            program_start: 0,
            memory_size: DEFAULT_MEMORY_SIZE,
        }
    }
}

impl CpuConfig {
    pub fn new(isa: Isa, memory: MemoryArchitecture, profile: RegisterProfile) -> Self {
        Self {
            isa,
            memory,
            profile,
            ..Self::default()
        }
    }

    pub fn with_program_start(mut self, start: u16) -> Self {
        self.program_start = start;
        self
    }

    pub fn with_memory_size(mut self, size: u16) -> Self {
        self.memory_size = size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.memory_size;
        if size % 2 != 0 || !(MIN_MEMORY_SIZE..=MAX_MEMORY_SIZE).contains(&size) {
            return Err(ConfigError::MemorySize(size));
        }
        if self.program_start >= size {
            return Err(ConfigError::ProgramStart {
                start: self.program_start,
                size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CpuState {
    Running,
    /// An `in` instruction is suspended until `input_finish`.
    AwaitingInput { port: u16 },
    /// A fatal trap stopped the CPU; it accepts no further operations.
    Faulted,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    #[error("invalid instruction at {ip:#06x}: {source}")]
    InvalidInstruction {
        ip: u16,
        #[source]
        source: DecodeError,
    },
    #[error("memory access out of range: {0}")]
    Memory(#[from] MemoryError),
    #[error("division by zero at {ip:#06x}")]
    DivisionByZero { ip: u16 },
    #[error("register {0} does not exist in this configuration")]
    MissingRegister(Reg),
    #[error("instruction at {ip:#06x} writes to an immediate")]
    ImmediateDestination { ip: u16 },
    #[error("instruction at {ip:#06x} is missing an operand")]
    MissingOperand { ip: u16 },
    #[error("waiting for input on port {port}; call input_finish first")]
    AwaitingInput { port: u16 },
    #[error("no input is pending")]
    NoPendingInput,
    #[error("input {0:?} is not a binary number")]
    InvalidInput(String),
    #[error("input {0:?} is wider than a 16-bit word")]
    InputTooWide(String),
    #[error("cpu has faulted and must be rebuilt")]
    Faulted,
}

impl Trap {
    /// Usage errors are rejected without touching CPU state.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Trap::AwaitingInput { .. }
                | Trap::NoPendingInput
                | Trap::InvalidInput(_)
                | Trap::InputTooWide(_)
                | Trap::Faulted
        )
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid program text: {0}")]
    Bits(MemoryError),
    #[error("program of {bits} bits does not fit at byte {start} of a {size}-byte store")]
    TooLarge { bits: usize, start: u16, size: u16 },
}

/// Serializable view of everything an observer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub isa: Isa,
    pub state: CpuState,
    pub steps: u64,
    pub registers: BTreeMap<String, u16>,
    pub ports: BTreeMap<String, String>,
    pub instruction: String,
    pub program_memory: String,
    pub data_memory: String,
}

#[derive(Debug, Clone)]
pub struct Cpu {
    cfg: CpuConfig,
    machine: Machine,
    state: CpuState,
    instruction: Bits,
    steps: u64,
}

impl Cpu {
    pub fn new(cfg: CpuConfig, program: &BitsRef) -> Result<Self, LoadError> {
        cfg.validate()?;
        let mut memory = MemoryModel::new(cfg.memory, cfg.memory_size as usize);
        memory
            .load_program(program, cfg.program_start)
            .map_err(|_| LoadError::TooLarge {
                bits: program.len(),
                start: cfg.program_start,
                size: cfg.memory_size,
            })?;

        let mut regs = Registers::new(cfg.isa, cfg.profile);
        regs.set_ip(cfg.program_start);
        regs.set_sp(cfg.memory_size);
        // Only the ISAs that have these registers keep the values.
        regs.set(Reg::Bp, cfg.memory_size);
        regs.set(Reg::Tos, cfg.memory_size / 2);

        debug!(isa = %cfg.isa, memory = %cfg.memory, bits = program.len(), "cpu loaded");
        Ok(Self {
            cfg,
            machine: Machine {
                regs,
                memory,
                ports: PortBank::default(),
            },
            state: CpuState::Running,
            instruction: Bits::new(),
            steps: 0,
        })
    }

    /// Build from the '0'/'1' text an assembler emits.
    pub fn from_binary(cfg: CpuConfig, text: &str) -> Result<Self, LoadError> {
        let bits = parse_bits(text).map_err(LoadError::Bits)?;
        Self::new(cfg, &bits)
    }

    pub fn config(&self) -> &CpuConfig {
        &self.cfg
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    pub fn registers(&self) -> &Registers {
        &self.machine.regs
    }

    pub fn register(&self, name: &str) -> Option<u16> {
        self.machine.regs.by_name(name)
    }

    pub fn program_memory(&self) -> &BitBlock {
        self.machine.memory.program()
    }

    pub fn data_memory(&self) -> &BitBlock {
        self.machine.memory.data()
    }

    pub fn ports(&self) -> &PortBank {
        &self.machine.ports
    }

    /// Raw bits of the most recently fetched instruction.
    pub fn instruction(&self) -> &BitsRef {
        &self.instruction
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Execute one instruction, or enter `AwaitingInput` on `in`.
    pub fn step(&mut self) -> Result<(), Trap> {
        match self.state {
            CpuState::Running => {}
            CpuState::AwaitingInput { port } => return Err(Trap::AwaitingInput { port }),
            CpuState::Faulted => return Err(Trap::Faulted),
        }
        let result = self.execute();
        if let Err(trap) = &result {
            self.fault(trap);
        }
        result
    }

    /// Alias of [`Cpu::step`] under the name the dashboard calls.
    pub fn web_next_instruction(&mut self) -> Result<(), Trap> {
        self.step()
    }

    /// Complete a pending `in` with a '0'/'1' string of at most 16 bits,
    /// zero-extended to a word.
    pub fn input_finish(&mut self, bits: &str) -> Result<(), Trap> {
        self.pending_port()?;
        let value = parse_input(bits)?;
        self.input_finish_word(value)
    }

    pub fn input_finish_word(&mut self, value: u16) -> Result<(), Trap> {
        let port = self.pending_port()?;
        let pending = match self.machine.ports.port_mut(port).input {
            InputState::AwaitingValue(p) => p,
            InputState::Idle => return Err(Trap::NoPendingInput),
        };

        if let Err(trap) = self.machine.store(pending.dest, value) {
            self.fault(&trap);
            return Err(trap);
        }
        let remaining = pending.remaining.saturating_sub(1);
        debug!(port, value, remaining, "input received");

        let input = &mut self.machine.ports.port_mut(port).input;
        if remaining > 0 {
            *input = InputState::AwaitingValue(PendingInput {
                dest: pending.dest.next(),
                remaining,
                width: pending.width,
            });
        } else {
            *input = InputState::Idle;
            let ip = self.machine.regs.ip();
            self.machine.regs.set_ip(ip.wrapping_add(pending.width));
            self.state = CpuState::Running;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let registers = self.machine.regs.iter().map(|(r, v)| (r.name(), v)).collect();
        let ports = self
            .machine
            .ports
            .iter()
            .map(|(k, p)| (k.clone(), p.to_string()))
            .collect();
        let program = self.program_memory();
        let data = self.data_memory();
        Snapshot {
            isa: self.cfg.isa,
            state: self.state,
            steps: self.steps,
            registers,
            ports,
            instruction: bits_to_string(&self.instruction),
            program_memory: program.hex(0, program.len()).unwrap_or_default(),
            data_memory: data.hex(0, data.len()).unwrap_or_default(),
        }
    }

    fn pending_port(&self) -> Result<u16, Trap> {
        match self.state {
            CpuState::AwaitingInput { port } => Ok(port),
            CpuState::Running => Err(Trap::NoPendingInput),
            CpuState::Faulted => Err(Trap::Faulted),
        }
    }

    fn fault(&mut self, trap: &Trap) {
        if trap.is_fatal() {
            warn!(ip = self.machine.regs.ip(), %trap, "cpu faulted");
            self.state = CpuState::Faulted;
        }
    }

    fn execute(&mut self) -> Result<(), Trap> {
        let ip = self.machine.regs.ip();
        let program = self.machine.memory.program();
        let (start, len) = (ip as usize * 8, program.len());
        if start >= len {
            return Err(MemoryError::OutOfBounds { start, end: start + 8, len }.into());
        }
        let end = (start + self.cfg.isa.max_width() as usize * 8).min(len);
        self.instruction = program.read(start, end)?.to_bitvec();
        let window = self.instruction.clone();

        let m = &mut self.machine;
        let result = match self.cfg.isa {
            Isa::Stack => run(&StackDecoder, &StackExecutor, m, ip, &window),
            Isa::Accumulator => run(&AccumulatorDecoder, &AccumulatorExecutor, m, ip, &window),
            Isa::Risc => run(&RiscDecoder, &RiscExecutor, m, ip, &window),
            Isa::Cisc => run(&CiscDecoder, &CiscExecutor, m, ip, &window),
        };
        let (flow, width) = match result {
            Ok(done) => done,
            Err(Fetch::Decode(DecodeError::Truncated { needed, .. })) => {
                return Err(MemoryError::OutOfBounds { start, end: start + needed, len }.into());
            }
            Err(Fetch::Decode(source)) => return Err(Trap::InvalidInstruction { ip, source }),
            Err(Fetch::Trap(trap)) => return Err(trap),
        };

        self.instruction.truncate(width as usize * 8);
        self.steps += 1;
        debug!(
            ip,
            bits = %bits_to_string(&self.instruction),
            asm = %disasm::disassemble(self.cfg.isa, &self.instruction).unwrap_or_default(),
            "step"
        );

        match flow {
            Flow::Next => self.machine.regs.set_ip(ip.wrapping_add(width)),
            Flow::Jump(to) => self.machine.regs.set_ip(to),
            Flow::Input { port, dest, count } => {
                self.machine.ports.port_mut(port).input = InputState::AwaitingValue(PendingInput {
                    dest,
                    remaining: count,
                    width,
                });
                self.state = CpuState::AwaitingInput { port };
                debug!(port, ?dest, count, "awaiting input");
            }
        }
        Ok(())
    }
}

enum Fetch {
    Decode(DecodeError),
    Trap(Trap),
}

fn run<D, X>(
    dec: &D,
    exec: &X,
    m: &mut Machine,
    ip: u16,
    window: &BitsRef,
) -> Result<(Flow, u16), Fetch>
where
    D: Decoder,
    X: Executor<Op = D::Op>,
{
    let d = dec.decode(window).map_err(Fetch::Decode)?;
    let flow = exec.exec(m, ip, &d).map_err(Fetch::Trap)?;
    Ok((flow, d.width))
}

fn parse_input(text: &str) -> Result<u16, Trap> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c == '0' || c == '1') {
        return Err(Trap::InvalidInput(text.to_string()));
    }
    if text.len() > WORD_BITS {
        return Err(Trap::InputTooWide(text.to_string()));
    }
    Ok(text.chars().fold(0u16, |acc, c| (acc << 1) | (c == '1') as u16))
}

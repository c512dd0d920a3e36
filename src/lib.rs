pub mod assembler;
pub mod cpu;
pub mod decoder;
pub mod disasm;
pub mod exec;
pub mod instructions;
pub mod isa;
pub mod machine;
pub mod memory;
pub mod ports;
pub mod registers;

pub use assembler::{assemble, AsmError, AsmErrorKind, Assembler, Program};
pub use cpu::{Cpu, CpuConfig, CpuState, LoadError, Snapshot, Trap};
pub use isa::Isa;
pub use memory::MemoryArchitecture;
pub use registers::{Reg, RegisterProfile};

/// A configuration name or value the simulator does not know.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown ISA `{0}` (expected stack, accumulator, risc or cisc)")]
    UnknownIsa(String),
    #[error("unknown memory architecture `{0}` (expected neumann or harvard)")]
    UnknownArchitecture(String),
    #[error("unknown register profile `{0}` (expected special or extended)")]
    UnknownProfile(String),
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    #[error("memory size {0} must be even and between 16 and 32768 bytes")]
    MemorySize(u16),
    #[error("program start {start} lies outside {size} bytes of memory")]
    ProgramStart { start: u16, size: u16 },
}

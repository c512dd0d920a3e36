use isasim::memory::{bits_to_string, MemoryError};
use isasim::{assemble, Assembler, Cpu, CpuConfig, Isa, MemoryArchitecture, RegisterProfile};
use pretty_assertions::assert_eq;

const CISC_HELLO: &str = include_str!("../demos/cisc/helloworld.asm");

fn cfg(isa: Isa, memory: MemoryArchitecture) -> CpuConfig {
    CpuConfig::new(isa, memory, RegisterProfile::Special)
}

#[test]
fn neumann_program_is_visible_as_data() {
    let program = assemble(Isa::Risc, "mov_low %R00, $0x41\nret").unwrap();
    let cpu = Cpu::new(cfg(Isa::Risc, MemoryArchitecture::Neumann), &program.bits).unwrap();
    let data = cpu.data_memory();
    assert_eq!(bits_to_string(data.read(0, 32).unwrap()), program.binary_code());
    assert_eq!(data.read_word(0).unwrap(), 0x1041);
}

#[test]
fn harvard_data_store_starts_empty() {
    let program = assemble(Isa::Risc, "mov_low %R00, $0x41\nret").unwrap();
    let cpu = Cpu::new(cfg(Isa::Risc, MemoryArchitecture::Harvard), &program.bits).unwrap();
    assert_eq!(bits_to_string(cpu.program_memory().read(0, 32).unwrap()), program.binary_code());
    assert!(cpu.data_memory().as_bits().not_any());
}

#[test]
fn neumann_writes_show_up_in_program_memory() {
    let program = assemble(Isa::Cisc, "mov [%R00+$100], $0x1234").unwrap();
    let mut cpu = Cpu::new(cfg(Isa::Cisc, MemoryArchitecture::Neumann), &program.bits).unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.program_memory().read_word(100).unwrap(), 0x1234);
}

#[test]
fn harvard_hello_world_reads_zeroes() {
    let program = assemble(Isa::Cisc, CISC_HELLO).unwrap();
    let mut cpu = Cpu::new(cfg(Isa::Cisc, MemoryArchitecture::Harvard), &program.bits).unwrap();
    for _ in 0..3 {
        cpu.step().unwrap();
    }
    // The string lives only in the program store, so the loop ends at once.
    assert_eq!(cpu.registers().ip(), program.symbols["end"]);
    assert!(cpu.ports().get("1").is_none());
    assert_eq!(cpu.ports().render("1"), " ".repeat(20));
}

#[test]
fn program_start_is_a_byte_offset() {
    let start = 0x40;
    let program = Assembler::new(Isa::Cisc).with_origin(start).assemble(CISC_HELLO).unwrap();
    let cfg = cfg(Isa::Cisc, MemoryArchitecture::Neumann).with_program_start(start);
    let mut cpu = Cpu::new(cfg, &program.bits).unwrap();
    assert_eq!(cpu.registers().ip(), start);
    assert!(cpu.program_memory().read(0, start as usize * 8).unwrap().not_any());
    for _ in 0..63 {
        cpu.step().unwrap();
    }
    assert_eq!(cpu.ports().render("1"), "        Hello world!");
}

#[test]
fn initial_registers() {
    let cpu = Cpu::from_binary(cfg(Isa::Stack, MemoryArchitecture::Neumann).with_memory_size(256), "").unwrap();
    assert_eq!(cpu.register("SP"), Some(256));
    assert_eq!(cpu.register("TOS"), Some(128));
    assert_eq!(cpu.register("IP"), Some(0));
    assert_eq!(cpu.register("ACC"), None);

    let cpu = Cpu::from_binary(cfg(Isa::Cisc, MemoryArchitecture::Neumann), "").unwrap();
    assert_eq!(cpu.register("BP"), Some(1024));
    assert_eq!(cpu.register("R03"), Some(0));
    assert_eq!(cpu.register("R04"), None);
}

#[test]
fn block_reads_are_bounds_checked() {
    let cpu = Cpu::from_binary(cfg(Isa::Risc, MemoryArchitecture::Neumann).with_memory_size(16), "").unwrap();
    let store = cpu.data_memory();
    assert_eq!(store.len(), 128);
    assert_eq!(
        store.read(120, 136).unwrap_err(),
        MemoryError::OutOfBounds { start: 120, end: 136, len: 128 }
    );
    assert!(store.read_word(15).is_err());
}

#[test]
fn program_text_must_be_bits() {
    let err = Cpu::from_binary(cfg(Isa::Risc, MemoryArchitecture::Neumann), "0102").unwrap_err();
    assert_eq!(
        err,
        isasim::LoadError::Bits(MemoryError::InvalidBit { index: 3, found: '2' })
    );
}

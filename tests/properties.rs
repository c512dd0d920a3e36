use isasim::registers::Flags;
use isasim::{assemble, Cpu, CpuConfig, CpuState, Isa, MemoryArchitecture, RegisterProfile};
use pretty_assertions::assert_eq;

fn boot(isa: Isa, src: &str) -> Cpu {
    let program = assemble(isa, src).unwrap();
    let cfg = CpuConfig::new(isa, MemoryArchitecture::Neumann, RegisterProfile::Extended);
    Cpu::new(cfg, &program.bits).unwrap()
}

#[test]
fn identical_runs_are_identical_after_every_step() {
    let src = "\
        in %R01, $1
loop:   out $2, %R01
        inc %R01
        push %R01
        pop [%R00+$200]
        cmp %R01, $'E'
        jl loop
end:    jmp end
";
    let mut a = boot(Isa::Cisc, src);
    let mut b = boot(Isa::Cisc, src);
    for _ in 0..40 {
        if a.state() == (CpuState::AwaitingInput { port: 1 }) {
            a.input_finish("1000001").unwrap();
            b.input_finish("1000001").unwrap();
        } else {
            a.step().unwrap();
            b.step().unwrap();
        }
        assert_eq!(a.snapshot(), b.snapshot());
    }
    assert_eq!(a.ports().render("2").trim_start(), "ABCD");
}

#[test]
fn ip_advances_by_encoded_width() {
    let src = "\
        mov %R00, %R01
        mov %R00, $5
        mov [%R01+$8], $5
        add [%R01], %R00
        not %R02
";
    let program = assemble(Isa::Cisc, src).unwrap();
    let mut cpu = boot(Isa::Cisc, src);
    for line in &program.listing {
        let before = cpu.registers().ip();
        assert_eq!(before, line.addr);
        cpu.step().unwrap();
        let width = (line.bits.len() / 8) as u16;
        assert_eq!(cpu.registers().ip(), before + width, "{}", line.source);
    }
}

#[test]
fn push_then_pop_restores_sp() {
    let mut cpu = boot(Isa::Risc, "mov_low %R01, $-7\npush %R01\npop %R02");
    cpu.step().unwrap();
    let sp = cpu.register("SP");
    cpu.step().unwrap();
    assert_eq!(cpu.register("SP").map(|v| v + 2), sp);
    cpu.step().unwrap();
    assert_eq!(cpu.register("SP"), sp);
    assert_eq!(cpu.register("R02"), Some(0xF9));
}

#[test]
fn ret_returns_after_the_call() {
    let cases = [
        (Isa::Stack, "call sub\nnop\nsub: ret"),
        (Isa::Accumulator, "call sub\nnop\nsub: ret"),
        (Isa::Risc, "call sub\nnop\nsub: ret"),
        (Isa::Cisc, "call sub\nnop\nsub: ret"),
    ];
    for (isa, src) in cases {
        let program = assemble(isa, src).unwrap();
        let mut cpu = boot(isa, src);
        let call_width = program.listing[0].bits.len() as u16 / 8;
        cpu.step().unwrap();
        assert_eq!(cpu.registers().ip(), program.symbols["sub"], "{isa}");
        cpu.step().unwrap();
        assert_eq!(cpu.registers().ip(), call_width, "{isa}");
        assert_eq!(cpu.register("SP"), Some(1024), "{isa}");
    }
}

#[test]
fn signed_and_unsigned_comparison_disagree_on_the_top_bit() {
    let mut cpu = boot(Isa::Stack, "mov $5\nmov $0xFFFF\ncmpb\ndrop\nmov $5\nmov $-1\ncmp");
    for _ in 0..3 {
        cpu.step().unwrap();
    }
    assert_eq!(cpu.register("FR"), Some(Flags::LESS.bits()));
    let tos = cpu.register("TOS").unwrap();
    assert_eq!(cpu.data_memory().read_word(tos - 2).unwrap(), 0xFFFF);
    for _ in 0..4 {
        cpu.step().unwrap();
    }
    assert_eq!(cpu.register("FR"), Some(Flags::GREATER.bits()));
}

#[test]
fn register_arithmetic_wraps() {
    let mut cpu = boot(Isa::Risc, "mov_low %R01, $1\nsub %R00, %R00, %R01\nmul %R02, %R00, %R00");
    for _ in 0..3 {
        cpu.step().unwrap();
    }
    assert_eq!(cpu.registers().as_unsigned(isasim::Reg::R(0)), Some(0xFFFF));
    assert_eq!(cpu.registers().as_signed(isasim::Reg::R(0)), Some(-1));
    assert_eq!(cpu.register("R02"), Some(1));
}

use isasim::{assemble, Cpu, CpuConfig, CpuState, Isa, MemoryArchitecture, RegisterProfile, Trap};
use pretty_assertions::assert_eq;

fn boot(isa: Isa, profile: RegisterProfile, src: &str) -> Cpu {
    let program = assemble(isa, src).unwrap();
    let cfg = CpuConfig::new(isa, MemoryArchitecture::Neumann, profile);
    Cpu::new(cfg, &program.bits).unwrap()
}

/// Step into `in`, check the suspension, feed `value`, then run `after` more steps.
fn round_trip(cpu: &mut Cpu, port: u16, width: u16, value: &str, after: usize) {
    let ip = cpu.registers().ip();
    cpu.step().unwrap();
    assert_eq!(cpu.state(), CpuState::AwaitingInput { port });
    assert_eq!(cpu.registers().ip(), ip, "IP must not move while waiting");
    cpu.input_finish(value).unwrap();
    assert_eq!(cpu.state(), CpuState::Running);
    assert_eq!(cpu.registers().ip(), ip + width);
    for _ in 0..after {
        cpu.step().unwrap();
    }
}

#[test]
fn stack_input_lands_on_the_operand_stack() {
    let mut cpu = boot(Isa::Stack, RegisterProfile::Special, "in $3\nout $1");
    round_trip(&mut cpu, 3, 3, "1000001", 1);
    assert_eq!(cpu.ports().render("1").trim_start(), "A");
}

#[test]
fn accumulator_input_lands_in_acc() {
    let mut cpu = boot(Isa::Accumulator, RegisterProfile::Special, "in $2\ninc\nout $2");
    round_trip(&mut cpu, 2, 3, "1000001", 2);
    assert_eq!(cpu.register("ACC"), Some(0x42));
    assert_eq!(cpu.ports().render("2").trim_start(), "B");
}

#[test]
fn risc_input_lands_in_a_register() {
    let mut cpu = boot(Isa::Risc, RegisterProfile::Special, "in %R01, $5\nout $5, %R01");
    round_trip(&mut cpu, 5, 2, "0000000001011010", 1);
    assert_eq!(cpu.register("R01"), Some(0x5A));
    assert_eq!(cpu.ports().render("5").trim_start(), "Z");
}

#[test]
fn cisc_input_can_target_memory() {
    let mut cpu = boot(Isa::Cisc, RegisterProfile::Special, "in [%R00+$64], $7\nout $7, [%R00+$64]");
    round_trip(&mut cpu, 7, 6, "111111", 1);
    assert_eq!(cpu.data_memory().read_word(64).unwrap(), 63);
    assert_eq!(cpu.ports().render("7").trim_start(), "?");
}

#[test]
fn in4_waits_for_four_words() {
    let mut cpu = boot(Isa::Cisc, RegisterProfile::Extended, "in4 %R00, $1\nout4 $2, %R00");
    cpu.step().unwrap();
    for (i, ch) in "Hi!?".chars().enumerate() {
        assert_eq!(cpu.state(), CpuState::AwaitingInput { port: 1 }, "before word {i}");
        assert_eq!(cpu.registers().ip(), 0);
        cpu.input_finish_word(ch as u16).unwrap();
    }
    assert_eq!(cpu.state(), CpuState::Running);
    assert_eq!(cpu.registers().ip(), 4);
    cpu.step().unwrap();
    assert_eq!(cpu.ports().render("2").trim_start(), "Hi!?");
}

#[test]
fn stepping_while_waiting_is_rejected() {
    let mut cpu = boot(Isa::Risc, RegisterProfile::Special, "in %R00, $1\nnop");
    cpu.step().unwrap();
    let before = cpu.snapshot();
    assert_eq!(cpu.step(), Err(Trap::AwaitingInput { port: 1 }));
    assert_eq!(cpu.snapshot(), before);
    // Still recoverable.
    cpu.input_finish("1").unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.registers().ip(), 4);
}

#[test]
fn finishing_without_a_request_is_rejected() {
    let mut cpu = boot(Isa::Risc, RegisterProfile::Special, "nop");
    let before = cpu.snapshot();
    assert_eq!(cpu.input_finish("1"), Err(Trap::NoPendingInput));
    assert_eq!(cpu.snapshot(), before);
    assert_eq!(cpu.state(), CpuState::Running);
}

#[test]
fn bad_input_text_keeps_the_request_open() {
    let mut cpu = boot(Isa::Accumulator, RegisterProfile::Special, "in $1");
    cpu.step().unwrap();
    assert!(matches!(cpu.input_finish("2"), Err(Trap::InvalidInput(_))));
    assert!(matches!(cpu.input_finish(&"1".repeat(17)), Err(Trap::InputTooWide(_))));
    assert_eq!(cpu.state(), CpuState::AwaitingInput { port: 1 });
    cpu.input_finish("1111111111111111").unwrap();
    assert_eq!(cpu.register("ACC"), Some(0xFFFF));
}

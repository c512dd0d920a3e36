use isasim::{assemble, Cpu, CpuConfig, Isa, MemoryArchitecture, RegisterProfile};
use pretty_assertions::assert_eq;

fn boot(isa: Isa, src: &str) -> Cpu {
    let program = assemble(isa, src).unwrap();
    let cfg = CpuConfig::new(isa, MemoryArchitecture::Neumann, RegisterProfile::Extended);
    Cpu::new(cfg, &program.bits).unwrap()
}

fn ips_after_each_step(cpu: &mut Cpu, n: usize) -> Vec<u16> {
    (0..n)
        .map(|_| {
            cpu.step().unwrap();
            cpu.registers().ip()
        })
        .collect()
}

#[test]
fn risc_numeric_displacements_count_words() {
    let src = "\
jmp $3
nop
nop
mov_low %R00, $2
mov_low %R02, $3
cmp %R00, %R02
je $-2
jne $-6
";
    let mut cpu = boot(Isa::Risc, src);
    assert_eq!(ips_after_each_step(&mut cpu, 8), [6, 8, 10, 12, 14, 2, 4, 6]);
}

#[test]
fn risc_numeric_and_label_branches_agree() {
    let by_label = assemble(Isa::Risc, "jmp skip\nnop\nskip: call back\nback: nop").unwrap();
    let by_number = assemble(Isa::Risc, "jmp $2\nnop\ncall $1\nnop").unwrap();
    assert_eq!(by_label.binary_code(), by_number.binary_code());
}

#[test]
fn byte_coded_displacements_count_bytes() {
    // jmp is three bytes wide on the stack machine.
    let mut cpu = boot(Isa::Stack, "jmp $4\nnop\nnop");
    assert_eq!(ips_after_each_step(&mut cpu, 1), [4]);
}

use isasim::disasm::{decode_one, disassemble_program};
use isasim::memory::parse_bits;
use isasim::{assemble, Isa};
use pretty_assertions::assert_eq;

const DEMOS: [(Isa, &str); 4] = [
    (Isa::Stack, include_str!("../demos/stack/helloworld.asm")),
    (Isa::Accumulator, include_str!("../demos/accumulator/helloworld.asm")),
    (Isa::Risc, include_str!("../demos/risc/helloworld.asm")),
    (Isa::Cisc, include_str!("../demos/cisc/helloworld.asm")),
];

#[test]
fn disassembly_reassembles_to_the_same_code() {
    for (isa, src) in DEMOS {
        let program = assemble(isa, src).unwrap();
        let code_end = program.symbols["text"];
        let text: Vec<String> = disassemble_program(isa, &program.bits, 0)
            .into_iter()
            .filter(|l| l.addr < code_end)
            .map(|l| l.text)
            .collect();
        let again = assemble(isa, &text.join("\n")).unwrap();
        assert_eq!(
            again.binary_code(),
            &program.binary_code()[..code_end as usize * 8],
            "{isa}"
        );
    }
}

#[test]
fn risc_hello_world_listing() {
    let program = assemble(Isa::Risc, DEMOS[2].1).unwrap();
    let text: Vec<String> = disassemble_program(Isa::Risc, &program.bits, 0)
        .into_iter()
        .take(9)
        .map(|l| format!("{:#06x} {}", l.addr, l.text))
        .collect();
    assert_eq!(
        text,
        [
            "0x0000 mov_low %R00, $18",
            "0x0002 mov_low %R02, $2",
            "0x0004 load %R01, [%R00]",
            "0x0006 cmp %R01, $0",
            "0x0008 je $4",
            "0x000a out $1, %R01",
            "0x000c add %R00, %R00, %R02",
            "0x000e jmp $-5",
            "0x0010 jmp $0",
        ]
    );
}

#[test]
fn cisc_operand_forms() {
    let cases = [
        ("mov [%R01-$2], $65", "mov [%R01-$2], $65"),
        ("add4 %R00, [%R04]", "add4 %R00, [%R04]"),
        ("jmp %R02+$6", "jmp %R02+$6"),
        ("jle back\nback:", "jle $4"),
        ("out $1, [%R00+$0x10]", "out $1, [%R00+$16]"),
    ];
    for (src, expected) in cases {
        let program = assemble(Isa::Cisc, src).unwrap();
        let (text, width) = decode_one(Isa::Cisc, &program.bits).unwrap();
        assert_eq!(text, expected);
        assert_eq!(width as usize * 8, program.bits.len());
    }
}

#[test]
fn undecodable_bits_report_the_pattern() {
    let bits = parse_bits("11111100").unwrap();
    let err = decode_one(Isa::Stack, &bits).unwrap_err();
    assert_eq!(err.to_string(), "invalid instruction bits 11111100");
}

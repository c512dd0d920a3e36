use anyhow::{bail, Context, Result};
use clap::Parser;
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use isasim::{Assembler, Cpu, CpuConfig, CpuState, Isa, MemoryArchitecture, RegisterProfile};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a program on the isasim CPU (assembles .asm sources first)"
)]
struct Opts {
    /// JSON CpuConfig; flags below override its fields.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    isa: Option<Isa>,
    #[arg(long)]
    memory: Option<MemoryArchitecture>,
    #[arg(long)]
    profile: Option<RegisterProfile>,
    /// Load address in bytes.
    #[arg(short, long)]
    start: Option<u16>,
    #[arg(long)]
    memory_size: Option<u16>,
    /// Stop after this many instructions.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    steps: u64,
    /// Values for `in`, as '0'/'1' strings, consumed in order.
    #[arg(short, long = "input", value_name = "BITS")]
    inputs: Vec<String>,
    /// Characters for `in`, one per request, after the --input values.
    #[arg(long)]
    text: Option<String>,
    /// Print the final snapshot as JSON instead of the port displays.
    #[arg(long)]
    json: bool,
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,
}

fn config(opts: &Opts) -> Result<CpuConfig> {
    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => CpuConfig::default(),
    };
    if let Some(isa) = opts.isa {
        cfg.isa = isa;
    }
    if let Some(memory) = opts.memory {
        cfg.memory = memory;
    }
    if let Some(profile) = opts.profile {
        cfg.profile = profile;
    }
    if let Some(start) = opts.start {
        cfg.program_start = start;
    }
    if let Some(size) = opts.memory_size {
        cfg.memory_size = size;
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let cfg = config(&opts)?;

    let source = std::fs::read_to_string(&opts.program)
        .with_context(|| format!("reading {}", opts.program.display()))?;
    let mut cpu = if opts.program.extension().is_some_and(|e| e == "asm") {
        let program = Assembler::new(cfg.isa)
            .with_origin(cfg.program_start)
            .assemble(&source)?;
        Cpu::new(cfg, &program.bits)?
    } else {
        Cpu::from_binary(cfg, &source)?
    };

    let mut queue: VecDeque<u16> = VecDeque::new();
    for bits in &opts.inputs {
        match u16::from_str_radix(bits, 2) {
            Ok(v) => queue.push_back(v),
            Err(_) => bail!("--input {bits:?} is not a 16-bit binary number"),
        }
    }
    if let Some(text) = &opts.text {
        queue.extend(text.chars().map(|c| c as u16));
    }

    while cpu.steps() < opts.steps {
        match cpu.state() {
            CpuState::Running => {
                if let Err(trap) = cpu.step() {
                    eprintln!("TRAP after {} steps: {trap}", cpu.steps());
                    break;
                }
            }
            CpuState::AwaitingInput { port } => match queue.pop_front() {
                Some(v) => cpu.input_finish_word(v)?,
                None => {
                    eprintln!("port {port} is waiting for input and the queue is empty");
                    break;
                }
            },
            CpuState::Faulted => break,
        }
    }

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&cpu.snapshot())?);
    } else {
        for (port, display) in cpu.ports().iter() {
            println!("port {port:>3}: [{display}]");
        }
        println!("steps: {}  ip: {:#06x}", cpu.steps(), cpu.registers().ip());
    }
    Ok(())
}

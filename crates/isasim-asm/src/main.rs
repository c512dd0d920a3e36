use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use isasim::disasm::disassemble_program;
use isasim::memory::parse_bits;
use isasim::{Assembler, Isa};

mod listing;
use listing::{labels, render_disasm, render_listing};

#[derive(Parser, Debug)]
#[command(author, version, about = "isasim assembler and disassembler", long_about = None)]
struct Cli {
    /// Target instruction set
    #[arg(long, default_value_t = Isa::Risc)]
    isa: Isa,
    /// Load address of the image in bytes
    #[arg(long, default_value_t = 0u16)]
    origin: u16,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a source file into '0'/'1' program text
    Build {
        #[arg(value_name = "SOURCE")]
        input: PathBuf,
        /// Output program file (default: SOURCE with a .bin extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the assembly listing
        #[arg(long)]
        listing: bool,
        /// Show encoded bits in the listing
        #[arg(long)]
        show_bits: bool,
        /// Export labels to JSON (Vec<{ addr, name }>)
        #[arg(long, value_name = "FILE")]
        symbols: Option<PathBuf>,
    },
    /// Disassemble a program file by linear sweep
    Disasm {
        #[arg(value_name = "BINFILE")]
        input: PathBuf,
        #[arg(long)]
        show_bits: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Build { input, output, listing, show_bits, symbols } => {
            let source = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let program = Assembler::new(cli.isa)
                .with_origin(cli.origin)
                .assemble(&source)
                .with_context(|| format!("assembling {}", input.display()))?;

            let output = output.unwrap_or_else(|| input.with_extension("bin"));
            std::fs::write(&output, program.binary_code())?;
            eprintln!("{}: {} bytes -> {}", input.display(), program.len_bytes(), output.display());

            if listing {
                print!("{}", render_listing(&program.listing, &program.symbols, show_bits));
            }
            if let Some(path) = symbols {
                let json = serde_json::to_string_pretty(&labels(&program.symbols))?;
                std::fs::write(path, json)?;
            }
        }
        Command::Disasm { input, show_bits, out } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let bits = parse_bits(&text)?;
            anyhow::ensure!(bits.len() % 8 == 0, "program is {} bits, not whole bytes", bits.len());

            let lines = disassemble_program(cli.isa, &bits, cli.origin);
            let mut buf = render_disasm(&lines, show_bits);
            let decoded: usize = lines.iter().map(|l| l.width as usize).sum();
            if decoded < bits.len() / 8 {
                buf.push_str(&format!("; {} trailing bytes not decoded\n", bits.len() / 8 - decoded));
            }
            if let Some(path) = out {
                std::fs::write(path, buf)?;
            } else {
                print!("{buf}");
            }
        }
    }
    Ok(())
}

//! Command line argument definitions

use clap::Parser;

/// Arguments accepted by the `ferrite-vm` binary
#[derive(Parser, Debug)]
#[command(name = "ferrite-vm", version, about = "Ferrite bytecode virtual machine")]
pub struct Cli {
    /// Assemble or load FILE (.fasm or .fmod) and execute its entry atom
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["build", "disasm", "input"]
    )]
    pub run: Option<String>,

    /// Assemble INPUT and write the binary module to FILE
    #[arg(long, value_name = "FILE", requires = "input")]
    pub build: Option<String>,

    /// Print the disassembly of INPUT
    #[arg(long, requires = "input")]
    pub disasm: bool,

    /// Source or module consumed by --build and --disasm
    #[arg(value_name = "INPUT")]
    pub input: Option<String>,

    /// Entry atom executed by --run
    #[arg(long, default_value = "main", value_name = "NAME")]
    pub entry: String,

    /// Emit the run report as a JSON object on stdout
    #[arg(long)]
    pub json: bool,
}

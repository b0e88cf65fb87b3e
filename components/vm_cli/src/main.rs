//! The `ferrite-vm` binary.
//!
//! Three modes, one per flag: `--run` executes a module and prints the
//! entry function's result, `--build` assembles a source into a binary
//! `.fmod` image, and `--disasm` prints a listing. Runs that trap exit
//! with status 1, usage problems with status 2.

use std::fs;
use std::path::Path;
use std::process;

use clap::Parser;
use vm_cli::{load_module, run_module, Cli, CliError, CliResult};

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        // A trap has already been written to stderr by the interpreter's
        // own diagnostic; repeating it here would double the report.
        if !matches!(error, CliError::Aborted(_)) {
            eprintln!("ferrite-vm: {}", error);
        }
        process::exit(1);
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    if let Some(path) = &cli.run {
        let module = load_module(Path::new(path))?;
        let report = run_module(module, &cli.entry)?;
        if cli.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report.result);
        }
        Ok(())
    } else if let (Some(out), Some(input)) = (&cli.build, &cli.input) {
        let module = load_module(Path::new(input))?;
        fs::write(out, module.to_bytes()).map_err(|source| CliError::Io {
            path: out.clone(),
            source,
        })?;
        Ok(())
    } else if let (true, Some(input)) = (cli.disasm, &cli.input) {
        let module = load_module(Path::new(input))?;
        print!("{}", module.disassemble());
        Ok(())
    } else {
        usage()
    }
}

/// Prints the mode synopsis and exits with the usage status.
fn usage() -> ! {
    eprintln!("usage: ferrite-vm --run <FILE> [--entry <NAME>] [--json]");
    eprintln!("       ferrite-vm --build <FILE> <INPUT>");
    eprintln!("       ferrite-vm --disasm <INPUT>");
    process::exit(2);
}

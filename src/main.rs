// micac: compiler for the Mica language

use anyhow::Context;
use clap::Parser;
use micac::compiler::{assemble, CompileOptions, Compiler};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "micac", about = "Compiler for the Mica language, targeting 32-bit x86")]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Output assembly file (defaults to the input with a .s extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directories to search for include directives
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include_paths: Vec<PathBuf>,

    /// Run the system assembler on the emitted file
    #[arg(long)]
    assemble: bool,
}

fn main() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    if let Err(error) = run(Cli::parse()) {
        eprintln!("error: {:#}", error);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let compiler = Compiler::new(CompileOptions {
        include_paths: cli.include_paths,
    });

    let assembly = compiler.compile_file(&cli.input)?;

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("s"));
    std::fs::write(&output, assembly)
        .with_context(|| format!("failed to write '{}'", output.display()))?;
    log::info!("wrote {}", output.display());

    if cli.assemble {
        let object = output.with_extension("o");
        assemble(&output, &object)?;
        log::info!("assembled {}", object.display());
    }

    Ok(())
}

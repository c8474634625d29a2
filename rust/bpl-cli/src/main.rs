//! BPL CLI: run, disassemble and inspect BPL bytecode programs.

use bpl_cli::args::parse_args;
use bpl_cli::colors::{bold, gray, green, red, status_label, yellow};
use bpl_cli::config::{BplConfig, CONFIG_FILE};
use bpl_cli::error::CliError;
use bpl_cli::load_program;
use bpl_core::disasm::{disassemble, DISASM_HEADER};
use bpl_core::InstructionTable;
use bpl_vm::Machine;
use clap::{Parser as ClapParser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "bpl", version, about = "The BPL bytecode virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON bytecode program
    Run {
        /// Path to the program JSON
        #[arg()]
        file: PathBuf,

        /// Native argument passed to the program (repeatable)
        #[arg(long = "arg", value_name = "VALUE", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Log every executed instruction
        #[arg(long)]
        trace: bool,

        /// Instruction budget (0 = unlimited)
        #[arg(long)]
        max_instructions: Option<u64>,

        /// Print the machine state after the program halts
        #[arg(long)]
        show_stack: bool,

        /// Config file to use instead of the nearest bpl.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Disassemble a JSON bytecode program
    Disasm {
        /// Path to the program JSON
        #[arg()]
        file: PathBuf,
    },
    /// List the instruction table
    Opcodes,
    /// Create a bpl.toml config file in the current directory
    Init,
}

fn main() {
    let cli = Cli::parse();

    let trace = matches!(cli.command, Commands::Run { trace: true, .. });
    init_tracing(trace);

    let result = match cli.command {
        Commands::Run {
            file,
            args,
            trace,
            max_instructions,
            show_stack,
            config,
        } => cmd_run(&file, &args, trace, max_instructions, show_stack, config),
        Commands::Disasm { file } => cmd_disasm(&file),
        Commands::Opcodes => cmd_opcodes(),
        Commands::Init => cmd_init(),
    };

    if let Err(e) = result {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; program output and fault reports own stdout.
fn init_tracing(trace: bool) {
    let default = if trace { "bpl_vm=trace" } else { "off" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cmd_run(
    file: &Path,
    args: &[String],
    trace: bool,
    max_instructions: Option<u64>,
    show_stack: bool,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let file_config = match config_path {
        Some(path) => BplConfig::load_from(&path)?,
        None => BplConfig::load()?,
    };
    let mut vm = file_config.vm.resolve();
    vm.trace |= trace;
    if let Some(limit) = max_instructions {
        vm.max_instructions = limit;
    }

    let program = load_program(file)?;
    let args = parse_args(args);
    tracing::debug!(file = %file.display(), argc = args.len(), "starting program");

    let mut machine = Machine::with_output(&program, io::stdout()).with_config(vm);
    let result = machine.start(args);

    if show_stack {
        eprintln!("{}", gray(&machine.dump()));
    }
    // a fatal fault's full report is already on stdout; stderr gets the summary
    result.map_err(CliError::from)
}

fn cmd_disasm(file: &Path) -> Result<(), CliError> {
    let program = load_program(file)?;
    let lines = disassemble(&program.code, InstructionTable::standard());
    println!("{}", bold(DISASM_HEADER));
    for line in &lines {
        if line.is_known() {
            println!("{}", line);
        } else {
            println!("{}", yellow(&line.to_string()));
        }
    }
    println!(
        "{}",
        gray(&format!(
            "{} instruction(s), {} word(s), pools: {} int / {} real / {} string",
            lines.len(),
            program.code.len(),
            program.ints.len(),
            program.reals.len(),
            program.strings.len()
        ))
    );
    Ok(())
}

fn cmd_opcodes() -> Result<(), CliError> {
    let table = InstructionTable::standard();
    println!("{}", bold(&format!("{:<6} {:<13} {}", "OP", "NAME", "ARGS")));
    for info in table.iter() {
        println!("0x{:02X}   {:<13} {}", info.op.word(), info.name, info.arity);
    }
    println!("{}", gray(&format!("{} opcodes", table.len())));
    Ok(())
}

fn cmd_init() -> Result<(), CliError> {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        return Err(CliError::AlreadyExists(path));
    }
    std::fs::write(&path, BplConfig::default_template())?;
    println!("{} {}", status_label("Created"), green(CONFIG_FILE));
    Ok(())
}

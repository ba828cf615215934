//! `ember` — run a script file, or drop into a line-at-a-time REPL when
//! no path is given.
//!
//! Exit codes follow the sysexits convention the distilled interpreter
//! uses: `0` success, `64` a malformed invocation (anything but zero or
//! one script path), `65` a compile error, `70` a runtime error, `74`
//! the script file couldn't be read.

mod error;

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use ember_vm::{InterpretResult, Vm};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use error::CliError;

const EX_OK: u8 = 0;
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_SOFTWARE: u8 = 70;
const EX_IOERR: u8 = 74;

const USAGE: &str = "Usage: ember [path]";

/// A tree-walking... no — a bytecode-compiled, stack-based interpreter
/// for the ember scripting language.
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(author = "ember contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run an ember script, or start a REPL", long_about = None)]
struct Cli {
    /// Script to run. Omit to start an interactive REPL; passing more than
    /// one is a usage error.
    #[arg(value_name = "path", num_args = 0..)]
    paths: Vec<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, env = "EMBER_VERBOSE")]
    verbose: bool,

    /// Log every dispatched instruction and the operand stack at trace level.
    #[arg(long, env = "EMBER_TRACE")]
    trace: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(cli.verbose, cli.trace) {
        eprintln!("error: {err}");
        return ExitCode::from(EX_SOFTWARE);
    }

    let result = match cli.paths.as_slice() {
        [] => run_repl(),
        [path] => run_file(path),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(EX_USAGE);
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(EX_IOERR)
        }
    }
}

fn init_logging(verbose: bool, trace: bool) -> error::Result<()> {
    let filter = if trace {
        EnvFilter::new("trace")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    // Diagnostic/trace logs always go to stderr: `run_file`/`run_repl`
    // hold a lock on stdout for the whole session, and `Stdout`'s lock
    // is not reentrant, so a default stdout-writing subscriber would
    // deadlock the moment a trace event fires.
    let subscriber = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

fn run_file(path: &Path) -> error::Result<u8> {
    let source = fs::read_to_string(path).map_err(|source| CliError::ReadScript {
        path: path.to_path_buf(),
        source,
    })?;

    let mut vm = Vm::new();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut stdout = stdout.lock();
    let mut stderr = stderr.lock();

    let code = match vm.interpret(&source, &mut stdout, &mut stderr) {
        InterpretResult::Ok => EX_OK,
        InterpretResult::CompileError => EX_DATAERR,
        InterpretResult::RuntimeError => EX_SOFTWARE,
    };
    Ok(code)
}

fn run_repl() -> error::Result<u8> {
    let mut vm = Vm::new();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut stdout = stdout.lock();
    let mut stderr = stderr.lock();

    loop {
        write!(stdout, "> ").map_err(CliError::ReadLine)?;
        stdout.flush().map_err(CliError::ReadLine)?;

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line).map_err(CliError::ReadLine)?;
        if bytes_read == 0 {
            writeln!(stdout).map_err(CliError::ReadLine)?;
            break;
        }

        // Ignore the interpret result: one bad line shouldn't end the
        // session, and the REPL always exits 0 on EOF.
        let _ = vm.interpret(&line, &mut stdout, &mut stderr);
    }

    Ok(EX_OK)
}

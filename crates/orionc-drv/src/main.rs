//! `orionc` — compiles one `.l` source file to portable C (`spec.md` §6).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use orionc_drv::{print_diagnostics, Config, Session};

/// `orionc <source.l> [-o output.c] [-d 0|1|2|3] [-O 0|1|2]`
#[derive(Parser, Debug)]
#[command(
    name = "orionc",
    about = "Compiles L source to portable C",
    disable_version_flag = true
)]
struct Cli {
    /// Source file to compile.
    source: PathBuf,

    /// Output C file path. Defaults to the input path with its extension
    /// replaced by `.c`.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Debug verbosity: 0 (quiet) through 3 (dump generated C).
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value_t = 0)]
    debug: u8,

    /// Optimizer level: 0 (off), 1 (fold + dead-code), 2 (all passes).
    #[arg(short = 'O', long = "opt", value_name = "LEVEL", default_value_t = 0)]
    opt: u8,

    /// Print the compiler's version triple and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::SetTrue)]
    version: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    init_tracing(cli.debug);

    let config = Config {
        output: cli.output,
        debug_level: cli.debug,
        opt_level: cli.opt,
    };

    let session = Session::new();
    let report = match session.compile(&cli.source, &config) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    print_diagnostics(&session, &cli.source);

    if report.error_count > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Maps `-d` to a `tracing` level filter: `0` installs no subscriber at all
/// (CLI output only), `1` is `info`, `2` is `debug` (rewrite/codegen stats),
/// `3` is `trace` (also dumps the generated C source).
fn init_tracing(debug_level: u8) {
    use tracing_subscriber::filter::LevelFilter;

    let level = match debug_level {
        0 => return,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .try_init();
}

use clap::Parser;
use std::{io, process::ExitCode};
use tracing_subscriber::{EnvFilter, fmt};

use qdu::{Args, Qdu};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qdu={}", default_level)));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut qdu = Qdu::from_args(&args);
    let failures = qdu.run(&args.paths, &mut io::stdout().lock(), &mut io::stderr().lock());

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

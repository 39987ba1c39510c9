use clap::Parser;
use divtrader::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}

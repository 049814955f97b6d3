use clap::Parser;
use shorthand::cli::{run, CliArgs};
use shorthand::error::ErrorChain;
use std::io::Write;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match run(&args) {
        Ok(output) => {
            if args.output.is_none() && !output.is_empty() {
                let mut stdout = std::io::stdout();
                if let Err(e) = stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()) {
                    log::error!("Failed to write output: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", ErrorChain::new(&e));
            ExitCode::FAILURE
        }
    }
}

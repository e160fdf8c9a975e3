use std::process::ExitCode;

use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use iec61937::utils::errors::RunError;

use cli::command::{Cli, Commands, LogFormat};
use cli::probe::cmd_probe;
use cli::run::cmd_run;

mod cli;
mod config;
mod endpoint;
pub(crate) mod timestamp;

/// Exit status for configuration and startup failures.
const EXIT_STARTUP: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    let pb = match init_logging(&cli, &multi) {
        Ok(pb) => pb,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    log::debug!(
        "{} {} ({}), library {}, built {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_DESCRIBE").unwrap_or("unknown revision"),
        iec61937::VERSION,
        env!("BUILD_TIMESTAMP")
    );

    let result = match cli.command {
        Commands::Run(ref args) => cmd_run(args, &cli, pb.then_some(&multi)),
        Commands::Probe(ref args) => cmd_probe(args, &cli, pb.then_some(&multi)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<RunError>() {
            Some(run) => {
                log::error!("{run}");
                ExitCode::from(run.exit_code())
            }
            None => {
                log::error!("{e:#}");
                ExitCode::from(EXIT_STARTUP)
            }
        },
    }
}

/// Returns whether progress output is routed through `multi`.
fn init_logging(cli: &Cli, multi: &MultiProgress) -> Result<bool> {
    let base_level = cli.loglevel.to_level_filter();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"msg\":{:?}}}",
                    buf.timestamp(),
                    record.level(),
                    record.args().to_string()
                )
            });
        }
    }

    if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Ok(true)
    } else {
        env_builder.try_init()?;
        Ok(false)
    }
}

//! T100K - Interactive console for T100K LED controllers
//!
//! Loads the configuration, brings up the network abstraction layer and
//! turns stdin lines into pixel updates.

mod console;
mod logging_setup;

use anyhow::{Context, Result};
use clap::Parser;
use console::Command;
use std::path::PathBuf;
use std::process::ExitCode;
use t100k_control::{NalError, T100kNal};
use t100k_core::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "t100k", version, about = "Drive T100K LED controllers over UDP")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Skip the check that the host owns an address on the controller subnet
    #[arg(long)]
    no_strict: bool,

    /// Also write logs to a file in the configured log directory
    #[arg(long)]
    log_file: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => AppConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.log_file {
        config.logging.file_output = true;
    }
    if args.no_strict {
        config.nal.strict_address_check = false;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let _log_guard = logging_setup::init(&config.logging)?;

    let mut nal = T100kNal::new();
    match nal.initialize(config.nal.clone()).await {
        Ok(()) => {}
        Err(NalError::NoUsableInterface(reason)) => {
            anyhow::bail!(
                "no usable network interface on {}/24 ({}); connect to the controller network or pass --no-strict",
                config.nal.subnet,
                reason
            );
        }
        Err(e) => return Err(e).context("Failed to initialize NAL"),
    }
    nal.start().context("Failed to start send loop")?;

    println!("{}", console::HELP);
    let outcome = read_commands(&nal).await;

    if let Err(e) = nal.stop().await {
        warn!("Stop failed: {}", e);
    }
    nal.destroy().await;
    info!("Shutdown complete");
    outcome
}

/// Process stdin until EOF, `quit` or Ctrl-C
async fn read_commands(nal: &T100kNal) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            info!("End of input");
            return Ok(());
        };

        match console::parse(&line) {
            Ok(Command::Empty) => {}
            Ok(Command::Help) => println!("{}", console::HELP),
            Ok(Command::Quit) => return Ok(()),
            Ok(Command::Set(item)) => {
                if let Err(e) = nal.update_data([item]) {
                    error!("Rejected `{}`: {}", item, e);
                    println!("error: {}", e);
                }
            }
            Err(e) => println!("error: {}", e),
        }
    }
}

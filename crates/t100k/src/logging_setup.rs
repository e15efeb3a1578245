use anyhow::{Context, Result};
use std::fs::File;
use t100k_core::LogConfig;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the file writer thread alive; flushes pending lines on drop
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` overrides the configured level. Console output goes to stderr
/// so that it does not interleave with the prompt on stdout.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.parse_level().into())
            .from_env_lossy()
    };

    let console = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter())
    });

    let (file, guard) = match config.file_output {
        true => {
            let (writer, guard) = open_log_file(config)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        false => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    tracing::info!("Logging initialized at level: {}", config.level);
    Ok(LogGuard { _file: guard })
}

fn open_log_file(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    config
        .ensure_log_directory()
        .context("Failed to create log directory")?;

    match config.cleanup_old_logs() {
        Ok(0) => {}
        Ok(removed) => eprintln!("Removed {} old log files", removed),
        Err(e) => eprintln!("Warning: Failed to cleanup old log files: {}", e),
    }

    let path = config.current_log_path();
    let file =
        File::create(&path).with_context(|| format!("Failed to create log file: {:?}", path))?;
    eprintln!("Logging to file: {:?}", path);

    Ok(tracing_appender::non_blocking(file))
}

use anyhow::Context;
use clap::Parser;
use plancake_pm::cli::Cli;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("PLANCAKE_PM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr, or to `file` when the supervisor is about to detach
fn init_tracing(file: Option<&Path>) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());

    match file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening supervisor log {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.daemon_log_path().as_deref()) {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }

    if let Err(e) = cli.execute() {
        eprintln!("✗ Error: {}", e);
        std::process::exit(1);
    }
}

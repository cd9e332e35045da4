use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use doc_indexer::cli::commands::{handle_config, handle_ingest, handle_status};
use doc_indexer::cli::output::get_formatter;
use doc_indexer::cli::{Cli, Commands};
use doc_indexer::models::{Config, OutputFormat};

/// Detect ONNX Runtime library path and set ORT_DYLIB_PATH if not already set.
/// Must be called before any ort code runs.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/doc-indexer/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/doc-indexer/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: Called at program start before any threads are spawned.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "doc_indexer=debug,info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    detect_and_set_ort_path();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = cli.format.unwrap_or_default();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprint!("{}", get_formatter(format).format_error(&e.to_string()));
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(async move {
        tokio::select! {
            result = run_command(cli, format) => match result {
                Ok(code) => ExitCode::from(code),
                Err(e) => {
                    eprint!("{}", get_formatter(format).format_error(&format!("{e:#}")));
                    ExitCode::FAILURE
                }
            },
            _ = shutdown_signal() => {
                warn!("received shutdown signal, stopping");
                eprintln!("\nReceived shutdown signal, stopping...");
                ExitCode::from(130)
            }
        }
    })
}

async fn run_command(cli: Cli, format: OutputFormat) -> Result<u8> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Ingest(args) => {
            let config = Config::load_from(config_path)?;
            handle_ingest(args, config, format, cli.verbose).await
        }
        Commands::Status => {
            let config = Config::load_from(config_path)?;
            handle_status(config, format, cli.verbose).await?;
            Ok(0)
        }
        Commands::Config(cmd) => {
            handle_config(cmd, config_path, format).await?;
            Ok(0)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

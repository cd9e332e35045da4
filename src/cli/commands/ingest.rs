//! Ingest command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::debug;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{
    Pipeline, PipelineSettings, ProgressEvent, VectorSink, create_backend, create_embedder,
};
use crate::utils::collect_files;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory (or single file) to ingest
    #[arg(required = true)]
    pub dir: PathBuf,

    /// Provenance URL stored with every point
    #[arg(long)]
    pub origin_url: Option<String>,

    /// Number of files processed at once
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// How deep to descend into subdirectories (1 = top level only)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// File patterns to exclude (can be specified multiple times)
    #[arg(long, short = 'e')]
    pub exclude: Vec<String>,

    /// Extract and chunk only; nothing is embedded or written
    #[arg(long)]
    pub dry_run: bool,
}

impl IngestArgs {
    /// Layer command-line flags over the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref url) = self.origin_url {
            config.ingest.origin_url = url.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.ingest.concurrency = concurrency;
        }
        if let Some(depth) = self.max_depth {
            config.ingest.max_depth = depth;
        }
        config
            .ingest
            .exclude_patterns
            .extend(self.exclude.iter().cloned());
    }
}

/// Run an ingestion and return the process exit code.
pub async fn handle_ingest(
    args: IngestArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<u8> {
    let formatter = get_formatter(format);
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let files = collect_files(
        &args.dir,
        config.ingest.max_depth,
        &config.ingest.exclude_patterns,
    )?;

    if files.is_empty() {
        println!("{}", formatter.format_message("No files found to ingest."));
        return Ok(0);
    }
    debug!(files = files.len(), dir = %args.dir.display(), "collected input files");

    let embedder =
        create_embedder(&config.embedding).context("failed to load embedding model")?;
    let store = create_backend(&config.vector_store).context("failed to create vector store")?;
    let sink = VectorSink::new(store, config.vector_size(), config.retry.to_retry_config());
    let pipeline = Pipeline::new(embedder, sink, PipelineSettings::from_config(&config))?;

    let pb = if format == OutputFormat::Json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(files.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let on_progress = |event: ProgressEvent<'_>| match event {
        ProgressEvent::Started(path) => {
            pb.set_message(path.display().to_string());
        }
        ProgressEvent::Finished(report) => {
            pb.inc(1);
            if verbose || !report.outcome.is_success() {
                pb.println(format!(
                    "{:>9} {}",
                    report.outcome.label(),
                    report.path.display()
                ));
            }
        }
    };

    let result = if args.dry_run {
        pipeline.dry_run(&files, on_progress).await
    } else {
        pipeline.run_with_progress(&files, on_progress).await
    };
    pipeline.sink().close();
    pb.finish_and_clear();

    let report = result.context("ingestion aborted")?;
    print!("{}", formatter.format_run_report(&report));

    Ok(report.exit_code())
}

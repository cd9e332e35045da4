//! Ingestion orchestration: extract, clean, chunk, embed and write each file.
//!
//! Files are processed one at a time unless `concurrency` is raised. Every
//! file ends in a [`FileOutcome`]; only an extraction failure under the
//! `abort` policy, or a failed collection bootstrap, stops the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, SinkError};
use crate::models::{Config, Document, ExtractErrorPolicy, SourceFormat, SourceItem};
use crate::services::chunker::TokenChunker;
use crate::services::cleaner::clean;
use crate::services::embedding::{Embedder, embed_document};
use crate::services::extractor::TextExtractor;
use crate::services::sink::VectorSink;
use crate::utils::RetryConfig;

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub file_timeout: Duration,
    pub on_extract_error: ExtractErrorPolicy,
    pub origin_url: String,
    pub batch_size: usize,
    pub retry: RetryConfig,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.ingest.concurrency.max(1),
            file_timeout: config.ingest.file_timeout(),
            on_extract_error: config.ingest.on_extract_error,
            origin_url: config.ingest.origin_url.clone(),
            batch_size: config.embedding.batch_size.max(1) as usize,
            retry: config.retry.to_retry_config(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    Chunk,
    Embed,
    Write,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Extract => write!(f, "extract"),
            Stage::Chunk => write!(f, "chunk"),
            Stage::Embed => write!(f, "embed"),
            Stage::Write => write!(f, "write"),
        }
    }
}

/// How a single file ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed { chunks: usize, points: usize },
    /// No text, or an unsupported format; nothing to write
    Empty,
    /// Dry run: chunked but neither embedded nor written
    Chunked { chunks: usize },
    Failed { stage: Stage, error: String },
    /// The write was attempted and given up on
    Dropped { error: String },
    TimedOut { after_secs: u64 },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            FileOutcome::Indexed { .. } | FileOutcome::Empty | FileOutcome::Chunked { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileOutcome::Indexed { .. } => "indexed",
            FileOutcome::Empty => "empty",
            FileOutcome::Chunked { .. } => "chunked",
            FileOutcome::Failed { .. } => "failed",
            FileOutcome::Dropped { .. } => "dropped",
            FileOutcome::TimedOut { .. } => "timed out",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub document_id: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
    pub elapsed_ms: u64,
}

/// Per-file outcomes of a run, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub collection: String,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
    pub duration_ms: u64,
}

impl RunReport {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn indexed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Indexed { .. } | FileOutcome::Chunked { .. }))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Empty))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn dropped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Dropped { .. }))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::TimedOut { .. }))
    }

    pub fn total_chunks(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Indexed { chunks, .. } | FileOutcome::Chunked { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }

    pub fn total_points(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Indexed { points, .. } => points,
                _ => 0,
            })
            .sum()
    }

    pub fn is_complete(&self) -> bool {
        self.files.iter().all(|f| f.outcome.is_success())
    }

    /// 0 when every file was indexed or empty, 2 when any file was lost.
    pub fn exit_code(&self) -> u8 {
        if self.is_complete() { 0 } else { 2 }
    }
}

/// Progress notifications emitted while a run is in flight.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    Started(&'a Path),
    Finished(&'a FileReport),
}

pub struct Pipeline {
    extractor: TextExtractor,
    chunker: TokenChunker,
    embedder: Arc<dyn Embedder>,
    sink: VectorSink,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Build a pipeline whose chunker uses the embedder's own tokenizer and window.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        sink: VectorSink,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let chunker = TokenChunker::new(embedder.tokenizer(), embedder.max_input_length())?;
        Ok(Self {
            extractor: TextExtractor::new(),
            chunker,
            embedder,
            sink,
            settings,
        })
    }

    pub fn sink(&self) -> &VectorSink {
        &self.sink
    }

    pub fn chunker(&self) -> &TokenChunker {
        &self.chunker
    }

    pub async fn run(&self, files: &[PathBuf]) -> Result<RunReport, PipelineError> {
        self.run_with_progress(files, |_| {}).await
    }

    /// Index every file. The collection is bootstrapped before the first write.
    pub async fn run_with_progress<F>(
        &self,
        files: &[PathBuf],
        on_progress: F,
    ) -> Result<RunReport, PipelineError>
    where
        F: Fn(ProgressEvent<'_>),
    {
        let started = Instant::now();
        self.sink.ensure_ready().await?;

        info!(
            files = files.len(),
            collection = self.sink.collection(),
            model = self.embedder.model_name(),
            concurrency = self.settings.concurrency,
            "starting ingestion"
        );

        let on_progress = &on_progress;
        let mut results = stream::iter(files)
            .map(|path| async move {
                on_progress(ProgressEvent::Started(path));
                let report = self.timed_file(path).await?;
                on_progress(ProgressEvent::Finished(&report));
                Ok::<_, PipelineError>(report)
            })
            .buffered(self.settings.concurrency.max(1));

        let mut reports = Vec::with_capacity(files.len());
        while let Some(result) = results.next().await {
            reports.push(result?);
        }

        let report = RunReport {
            collection: self.sink.collection().to_string(),
            dry_run: false,
            files: reports,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            indexed = report.indexed(),
            empty = report.empty(),
            failed = report.failed() + report.dropped() + report.timed_out(),
            points = report.total_points(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Extract, clean and chunk only; nothing is embedded or written.
    pub async fn dry_run<F>(
        &self,
        files: &[PathBuf],
        on_progress: F,
    ) -> Result<RunReport, PipelineError>
    where
        F: Fn(ProgressEvent<'_>),
    {
        let started = Instant::now();
        let mut reports = Vec::with_capacity(files.len());

        for path in files {
            on_progress(ProgressEvent::Started(path));
            let file_started = Instant::now();
            let item = SourceItem::new(path, self.settings.origin_url.as_str());

            let outcome = match self.prepare(&item).await {
                Ok(document) if document.has_chunks() => FileOutcome::Chunked {
                    chunks: document.chunks.len(),
                },
                Ok(_) => FileOutcome::Empty,
                Err(outcome) => outcome?,
            };

            let report = FileReport {
                path: path.clone(),
                document_id: item.document_id(),
                outcome,
                elapsed_ms: file_started.elapsed().as_millis() as u64,
            };
            on_progress(ProgressEvent::Finished(&report));
            reports.push(report);
        }

        Ok(RunReport {
            collection: self.sink.collection().to_string(),
            dry_run: true,
            files: reports,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn timed_file(&self, path: &Path) -> Result<FileReport, PipelineError> {
        let started = Instant::now();
        let item = SourceItem::new(path, self.settings.origin_url.as_str());

        let outcome =
            match tokio::time::timeout(self.settings.file_timeout, self.process(&item)).await {
                Ok(outcome) => outcome?,
                Err(_) => {
                    error!(path = %path.display(), "file processing timed out");
                    FileOutcome::TimedOut {
                        after_secs: self.settings.file_timeout.as_secs(),
                    }
                }
            };

        Ok(FileReport {
            path: path.to_path_buf(),
            document_id: item.document_id(),
            outcome,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Run one file through every stage.
    ///
    /// Returns `Err` only when the run must stop.
    pub async fn process(&self, item: &SourceItem) -> Result<FileOutcome, PipelineError> {
        let mut document = match self.prepare(item).await {
            Ok(document) => document,
            Err(outcome) => return outcome,
        };

        if document.has_chunks() {
            if let Err(e) = embed_document(
                self.embedder.as_ref(),
                &mut document,
                self.settings.batch_size,
                &self.settings.retry,
            )
            .await
            {
                error!(path = %item.path.display(), error = %e, "embedding failed");
                return Ok(FileOutcome::Failed {
                    stage: Stage::Embed,
                    error: e.to_string(),
                });
            }
        }

        match self.sink.write(&document).await {
            Ok(0) => Ok(FileOutcome::Empty),
            Ok(points) => {
                info!(path = %item.path.display(), chunks = document.chunks.len(), points, "indexed");
                Ok(FileOutcome::Indexed {
                    chunks: document.chunks.len(),
                    points,
                })
            }
            Err(e @ SinkError::Invariant(_)) => {
                error!(path = %item.path.display(), error = %e, "chunk alignment broken");
                Ok(FileOutcome::Failed {
                    stage: Stage::Write,
                    error: e.to_string(),
                })
            }
            Err(e) => {
                error!(path = %item.path.display(), error = %e, "write dropped");
                Ok(FileOutcome::Dropped {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Extract, clean and chunk `item` into a document.
    ///
    /// The error side carries the outcome to report instead.
    async fn prepare(
        &self,
        item: &SourceItem,
    ) -> Result<Document, Result<FileOutcome, PipelineError>> {
        let path = &item.path;
        if !item.format().is_supported() {
            warn!(path = %path.display(), "unsupported format, nothing will be indexed");
        }
        debug!(path = %path.display(), format = %SourceFormat::from_path(path), "extracting");

        let raw = match self.extractor.extract_blocking(path.clone()).await {
            Ok(raw) => raw,
            Err(source) => {
                return Err(match self.settings.on_extract_error {
                    ExtractErrorPolicy::Abort => Err(PipelineError::Extraction {
                        path: path.clone(),
                        source,
                    }),
                    ExtractErrorPolicy::Skip => {
                        error!(path = %path.display(), error = %source, "extraction failed");
                        Ok(FileOutcome::Failed {
                            stage: Stage::Extract,
                            error: source.to_string(),
                        })
                    }
                });
            }
        };

        let cleaned = clean(&raw);
        let segments = if cleaned.is_empty() {
            Vec::new()
        } else {
            vec![cleaned]
        };
        let mut document = Document::from_source(item, segments);

        match self.chunker.chunk_segments(&document.text) {
            Ok(chunks) => document.chunks = chunks,
            Err(e) => {
                error!(path = %path.display(), error = %e, "chunking failed");
                return Err(Ok(FileOutcome::Failed {
                    stage: Stage::Chunk,
                    error: e.to_string(),
                }));
            }
        }

        debug!(document_id = %document.id, chunks = document.chunks.len(), "chunked");
        Ok(document)
    }
}

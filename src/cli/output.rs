use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::OutputFormat;
use crate::services::{FileOutcome, RunReport};

pub trait Formatter {
    fn format_run_report(&self, report: &RunReport) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_provider: String,
    pub embedding_model_dir: String,
    pub max_input_length: u32,
    pub dimension: u32,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_exists: bool,
    pub vector_size: Option<u64>,
    pub distance: Option<String>,
    pub points: u64,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        let mut output = String::new();
        if report.dry_run {
            writeln!(output, "Dry Run Complete").unwrap();
            writeln!(output, "----------------").unwrap();
        } else {
            writeln!(output, "Ingestion Complete").unwrap();
            writeln!(output, "------------------").unwrap();
        }

        for file in &report.files {
            let detail = match &file.outcome {
                FileOutcome::Indexed { chunks, points } => {
                    format!("{} chunks, {} points", chunks, points)
                }
                FileOutcome::Chunked { chunks } => format!("{} chunks", chunks),
                FileOutcome::Empty => "no text".to_string(),
                FileOutcome::Failed { stage, error } => format!("{} stage: {}", stage, error),
                FileOutcome::Dropped { error } => error.clone(),
                FileOutcome::TimedOut { after_secs } => format!("after {}s", after_secs),
            };
            writeln!(
                output,
                "  [{}] {} ({})",
                file.outcome.label(),
                file.path.display(),
                detail
            )
            .unwrap();
        }
        if !report.files.is_empty() {
            writeln!(output).unwrap();
        }

        writeln!(output, "Collection:     {}", report.collection).unwrap();
        writeln!(output, "Files:          {}", report.files.len()).unwrap();
        writeln!(output, "Indexed:        {}", report.indexed()).unwrap();
        writeln!(output, "Empty:          {}", report.empty()).unwrap();
        writeln!(output, "Failed:         {}", report.failed()).unwrap();
        writeln!(output, "Dropped:        {}", report.dropped()).unwrap();
        writeln!(output, "Timed out:      {}", report.timed_out()).unwrap();
        writeln!(output, "Chunks:         {}", report.total_chunks()).unwrap();
        if !report.dry_run {
            writeln!(output, "Points written: {}", report.total_points()).unwrap();
        }
        writeln!(output, "Duration:       {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        writeln!(output, "Embedding:     {}", status.embedding_provider).unwrap();
        writeln!(output, "  Model dir:   {}", status.embedding_model_dir).unwrap();
        writeln!(output, "  Max tokens:  {}", status.max_input_length).unwrap();
        writeln!(output, "  Dimension:   {}", status.dimension).unwrap();
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "  URL:         {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.collection_exists {
            if let Some(size) = status.vector_size {
                writeln!(output, "  Vector size: {}", size).unwrap();
            }
            if let Some(ref distance) = status.distance {
                writeln!(output, "  Distance:    {}", distance).unwrap();
            }
            writeln!(output, "  Points:      {}", status.points).unwrap();
        } else if status.vector_store_connected {
            writeln!(output, "  (collection not created yet)").unwrap();
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
    }
}

impl Formatter for JsonFormatter {
    fn format_run_report(&self, report: &RunReport) -> String {
        let json = serde_json::json!({
            "collection": report.collection,
            "dry_run": report.dry_run,
            "summary": {
                "files": report.files.len(),
                "indexed": report.indexed(),
                "empty": report.empty(),
                "failed": report.failed(),
                "dropped": report.dropped(),
                "timed_out": report.timed_out(),
                "chunks": report.total_chunks(),
                "points": report.total_points(),
            },
            "files": report.files,
            "duration_ms": report.duration_ms,
        });
        self.render(&json)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

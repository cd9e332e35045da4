pub mod chunker;
pub mod cleaner;
pub mod embedding;
pub mod extractor;
pub mod payload;
pub mod pipeline;
pub mod sink;
pub mod vector_store;

pub use chunker::{TokenChunker, TokenCounter};
pub use cleaner::clean;
pub use embedding::{
    Embedder, HfTokenizer, HttpEmbedder, OnnxEmbedder, create_embedder, run_blocking,
};
pub use extractor::TextExtractor;
pub use payload::{build_payloads, build_points, point_id};
pub use pipeline::{
    FileOutcome, FileReport, Pipeline, PipelineSettings, ProgressEvent, RunReport, Stage,
};
pub use sink::{SinkState, VectorSink};
pub use vector_store::{CollectionInfo, InMemoryStore, QdrantBackend, VectorStore, create_backend};

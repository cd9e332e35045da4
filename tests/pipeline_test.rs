//! End-to-end ingestion runs against the in-memory vector store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use regex::Regex;
use sha2::{Digest, Sha256};

use doc_indexer::error::{ChunkError, EmbeddingError, PipelineError, SinkError, VectorStoreError};
use doc_indexer::models::ExtractErrorPolicy;
use doc_indexer::services::vector_store::COSINE;
use doc_indexer::services::{
    Embedder, FileOutcome, InMemoryStore, Pipeline, PipelineSettings, Stage, TokenCounter,
    VectorSink, VectorStore, point_id, run_blocking,
};
use doc_indexer::utils::{RetryConfig, collect_files};

const DIM: usize = 8;
const WINDOW: usize = 16;

/// Words and punctuation marks are tokens; two special tokens wrap every input.
struct RegexCounter {
    re: Regex,
}

impl TokenCounter for RegexCounter {
    fn token_spans(&self, text: &str) -> Result<Vec<(usize, usize)>, ChunkError> {
        Ok(self.re.find_iter(text).map(|m| (m.start(), m.end())).collect())
    }

    fn count_tokens(&self, text: &str) -> Result<usize, ChunkError> {
        Ok(self.token_spans(text)?.len() + 2)
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Normal,
    Fail,
    Hang,
    Block,
}

/// Deterministic embedder: the vector is derived from the SHA-256 of the text.
struct HashEmbedder {
    counter: Arc<RegexCounter>,
    behavior: Behavior,
}

impl HashEmbedder {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            counter: Arc::new(RegexCounter {
                re: Regex::new(r"\w+|[^\w\s]").unwrap(),
            }),
            behavior,
        })
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn max_input_length(&self) -> usize {
        WINDOW
    }

    fn tokenizer(&self) -> Arc<dyn TokenCounter> {
        self.counter.clone()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self.behavior {
            Behavior::Fail => Err(EmbeddingError::InferenceError("model crashed".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            Behavior::Block => {
                run_blocking(|| {
                    std::thread::sleep(Duration::from_millis(1500));
                    Ok(Vec::new())
                })
                .await
            }
            Behavior::Normal => Ok(texts
                .iter()
                .map(|t| {
                    Sha256::digest(t.as_bytes())
                        .iter()
                        .take(DIM)
                        .map(|b| f32::from(*b) / 255.0)
                        .collect()
                })
                .collect()),
        }
    }
}

fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        concurrency: 1,
        file_timeout: Duration::from_secs(30),
        on_extract_error: ExtractErrorPolicy::Skip,
        origin_url: "https://example.com/share".to_string(),
        batch_size: 4,
        retry: RetryConfig::no_retry(),
    }
}

fn pipeline_with(
    store: &InMemoryStore,
    embedder: Arc<HashEmbedder>,
    settings: PipelineSettings,
) -> Pipeline {
    let sink = VectorSink::new(Box::new(store.clone()), DIM as u64, RetryConfig::no_retry());
    Pipeline::new(embedder, sink, settings).unwrap()
}

fn pipeline(store: &InMemoryStore) -> Pipeline {
    pipeline_with(store, HashEmbedder::new(Behavior::Normal), settings())
}

const REPORT_TEXT: &str = "Quarterly revenue grew in every region. Costs were flat. \
    The board approved the new budget for the coming year. Hiring resumes in spring.";

fn stored_ids(store: &InMemoryStore) -> BTreeSet<String> {
    store.points().into_iter().map(|p| p.id).collect()
}

#[tokio::test]
async fn test_reingestion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("report.pdf"), &[REPORT_TEXT]);
    let files = collect_files(dir.path(), 1, &[]).unwrap();
    let store = InMemoryStore::new("docs");

    let first = pipeline(&store).run(&files).await.unwrap();
    let ids_after_first = stored_ids(&store);
    let count_after_first = store.len();

    let second = pipeline(&store).run(&files).await.unwrap();

    assert_eq!(first.exit_code(), 0);
    assert_eq!(second.exit_code(), 0);
    assert!(count_after_first > 1, "expected several chunks");
    assert_eq!(store.len(), count_after_first);
    assert_eq!(stored_ids(&store), ids_after_first);
    assert_eq!(first.total_points(), second.total_points());
    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn test_identical_text_shares_points_across_documents() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    write_pdf(&a, &[REPORT_TEXT]);
    write_pdf(&b, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let report = pipeline(&store).run(&[a.clone(), b.clone()]).await.unwrap();

    let (FileOutcome::Indexed { points: pa, .. }, FileOutcome::Indexed { points: pb, .. }) =
        (&report.files[0].outcome, &report.files[1].outcome)
    else {
        panic!("both files should be indexed: {:?}", report.files);
    };
    assert_eq!(pa, pb);
    assert_ne!(report.files[0].document_id, report.files[1].document_id);

    assert_eq!(store.len(), *pa);
    for point in store.points() {
        assert_eq!(point.id, point_id(&point.payload.text));
        assert_eq!(point.payload.metadata.source_name, b.to_string_lossy());
        assert_eq!(point.payload.metadata.origin_url, "https://example.com/share");
    }
}

#[tokio::test]
async fn test_missing_collection_created_once_with_configured_shape() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["one.pdf", "two.pdf", "three.pdf"] {
        write_pdf(&dir.path().join(name), &[name]);
    }
    let files = collect_files(dir.path(), 1, &[]).unwrap();
    let store = InMemoryStore::new("docs");
    assert!(store.get_collection_info().await.unwrap().is_none());

    let mut concurrent = settings();
    concurrent.concurrency = 3;
    let report = pipeline_with(&store, HashEmbedder::new(Behavior::Normal), concurrent)
        .run(&files)
        .await
        .unwrap();

    assert_eq!(report.indexed(), 3);
    assert_eq!(store.create_calls(), 1);
    let info = store.get_collection_info().await.unwrap().unwrap();
    assert_eq!(info.vector_size, Some(DIM as u64));
    assert_eq!(info.distance.as_deref(), Some(COSINE));
}

#[tokio::test]
async fn test_unsupported_and_blank_files_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "plain text is not a supported source").unwrap();
    let blank = dir.path().join("blank.pdf");
    write_pdf(&blank, &["   "]);
    let store = InMemoryStore::new("docs");

    let report = pipeline(&store).run(&[notes, blank]).await.unwrap();

    assert_eq!(report.files[0].outcome, FileOutcome::Empty);
    assert_eq!(report.files[1].outcome, FileOutcome::Empty);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(store.upsert_calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_chunks_fit_window_and_stay_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let long = "Hello world. ".repeat(40);
    let path = dir.path().join("long.pdf");
    write_pdf(&path, &[long.as_str(), REPORT_TEXT]);
    let store = InMemoryStore::new("docs");
    let pipeline = pipeline(&store);

    let report = pipeline.run(&[path]).await.unwrap();

    let FileOutcome::Indexed { chunks, points } = report.files[0].outcome else {
        panic!("unexpected outcome: {:?}", report.files[0].outcome);
    };
    assert_eq!(chunks, points);
    for point in store.points() {
        let tokens = pipeline.chunker().count_tokens(&point.payload.text).unwrap();
        assert!(tokens <= WINDOW, "{tokens} tokens: {}", point.payload.text);
        assert_eq!(point.vector.len(), DIM);
    }
}

#[tokio::test]
async fn test_extraction_failure_skipped_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.pdf");
    std::fs::write(&broken, b"not a pdf at all").unwrap();
    let good = dir.path().join("good.pdf");
    write_pdf(&good, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let report = pipeline(&store).run(&[broken, good]).await.unwrap();

    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::Failed {
            stage: Stage::Extract,
            ..
        }
    ));
    assert!(matches!(report.files[1].outcome, FileOutcome::Indexed { .. }));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_extraction_failure_aborts_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.pdf");
    std::fs::write(&broken, b"not a pdf at all").unwrap();
    let good = dir.path().join("good.pdf");
    write_pdf(&good, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let mut strict = settings();
    strict.on_extract_error = ExtractErrorPolicy::Abort;
    let result = pipeline_with(&store, HashEmbedder::new(Behavior::Normal), strict)
        .run(&[broken, good])
        .await;

    assert!(matches!(result, Err(PipelineError::Extraction { .. })));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_failed_write_is_dropped_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.pdf");
    let b = dir.path().join("b.pdf");
    write_pdf(&a, &["first document text"]);
    write_pdf(&b, &["second document text"]);
    let store = InMemoryStore::new("docs");
    store.fail_next_upserts(1);

    let report = pipeline(&store).run(&[a, b]).await.unwrap();

    assert!(matches!(report.files[0].outcome, FileOutcome::Dropped { .. }));
    assert!(matches!(report.files[1].outcome, FileOutcome::Indexed { .. }));
    assert_eq!(report.dropped(), 1);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_embedding_failure_fails_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    write_pdf(&path, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let report = pipeline_with(&store, HashEmbedder::new(Behavior::Fail), settings())
        .run(&[path])
        .await
        .unwrap();

    assert!(matches!(
        report.files[0].outcome,
        FileOutcome::Failed {
            stage: Stage::Embed,
            ..
        }
    ));
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_slow_file_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    write_pdf(&path, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let mut quick = settings();
    quick.file_timeout = Duration::from_millis(200);
    let report = pipeline_with(&store, HashEmbedder::new(Behavior::Hang), quick)
        .run(&[path])
        .await
        .unwrap();

    assert!(matches!(report.files[0].outcome, FileOutcome::TimedOut { .. }));
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_blocking_inference_still_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    write_pdf(&path, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let mut quick = settings();
    quick.file_timeout = Duration::from_millis(200);
    let report = pipeline_with(&store, HashEmbedder::new(Behavior::Block), quick)
        .run(&[path])
        .await
        .unwrap();

    assert!(matches!(report.files[0].outcome, FileOutcome::TimedOut { .. }));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_mismatched_collection_aborts_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    write_pdf(&path, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs").with_collection(1024, COSINE);

    let result = pipeline(&store).run(&[path]).await;

    assert!(matches!(
        result,
        Err(PipelineError::Sink(SinkError::Bootstrap(
            VectorStoreError::CollectionMismatch { .. }
        )))
    ));
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.pdf");
    write_pdf(&path, &[REPORT_TEXT]);
    let store = InMemoryStore::new("docs");

    let report = pipeline(&store)
        .dry_run(&[path], |_| {})
        .await
        .unwrap();

    assert!(report.dry_run);
    assert!(matches!(report.files[0].outcome, FileOutcome::Chunked { chunks } if chunks > 1));
    assert_eq!(store.create_calls(), 0);
    assert_eq!(store.upsert_calls(), 0);
}

#[test]
fn test_collect_files_ignores_nested_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("top.pdf"), &["top"]);
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    write_pdf(&dir.path().join("nested").join("deep.pdf"), &["deep"]);

    let files = collect_files(dir.path(), 1, &[]).unwrap();
    assert_eq!(files, vec![PathBuf::from(dir.path().join("top.pdf"))]);
}

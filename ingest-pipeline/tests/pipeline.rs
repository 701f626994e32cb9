//! End-to-end tests for the article pipeline: dedup admission, the
//! fallback branch, convergence, and idempotent persistence against an
//! in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ingest_common::record::FeedArticle;
use ingest_common::store::MemoryStore;
use ingest_pipeline::dedup::DedupFilter;
use ingest_pipeline::enrich::article::{
    ExtractError, Extraction, Extractor, FetchContent, FillContent, FillSummary,
};
use ingest_pipeline::enrich::text::{FrequencyKeyworder, LeadingSummarizer};
use ingest_pipeline::graph::{PipelineGraph, PipelineHandle};
use ingest_pipeline::sink::IdempotentSink;
use tokio::sync::mpsc;

const COLLECTION: &str = "rss.articles";

/// Extractor with a scripted response per link; unknown links fail.
struct ScriptedExtractor {
    responses: HashMap<String, (String, String)>,
}

impl ScriptedExtractor {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    fn with_text(mut self, link: &str, text: &str) -> Self {
        self.responses
            .insert(link.to_owned(), (text.to_owned(), String::new()));
        self
    }

    fn with_raw_only(mut self, link: &str, raw_html: &str) -> Self {
        self.responses
            .insert(link.to_owned(), (String::new(), raw_html.to_owned()));
        self
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, locator: &str) -> Result<Extraction, ExtractError> {
        match self.responses.get(locator) {
            Some((text, raw_html)) => Ok(Extraction {
                text: text.clone(),
                raw_html: raw_html.clone(),
            }),
            None => Err(ExtractError::Unavailable(locator.to_owned())),
        }
    }
}

fn article(link: &str) -> FeedArticle {
    FeedArticle {
        feed_source: "https://example.com/feed.xml".to_string(),
        title: "title".to_string(),
        link: link.to_string(),
        published: Some("Mon, 02 Jan 2006 15:04:05 +0000".to_string()),
        ..Default::default()
    }
}

/// Build the full article graph: dedup → fetch (branching) → cleanup →
/// convergence → summary → sink.
fn article_pipeline(
    store: Arc<MemoryStore>,
    dedup: Arc<DedupFilter>,
    extractor: Arc<dyn Extractor>,
) -> (mpsc::Sender<FeedArticle>, PipelineHandle) {
    let keyworder = Arc::new(FrequencyKeyworder::default());
    let summarizer = Arc::new(LeadingSummarizer::default());

    let mut graph = PipelineGraph::new("rss", 16);
    let feed = graph.channel("rss");
    let filtered = graph.channel("rss_filtered");
    let with_content = graph.channel("rss_with_content");
    let without_content = graph.channel("rss_without_content");
    let full = graph.channel("full_rss");

    graph.stage(dedup).input(feed).ok_output(filtered);
    graph
        .stage(FetchContent::new(
            extractor,
            keyworder.clone(),
            summarizer.clone(),
        ))
        .input(filtered)
        .ok_output(with_content)
        .degraded_output(without_content)
        .width(4);
    graph
        .stage(FillContent::new(keyworder, summarizer.clone()))
        .input(without_content)
        .ok_output(with_content)
        .width(4);
    graph
        .stage(FillSummary::new(summarizer))
        .input(with_content)
        .ok_output(full)
        .width(4);
    graph
        .stage(IdempotentSink::new(store, COLLECTION))
        .input(full);

    let entry = graph.entry(feed);
    let handle = graph.spawn().expect("failed to spawn article pipeline");
    (entry, handle)
}

#[tokio::test]
async fn test_end_to_end_fallback_and_duplicate_resubmission() {
    let store = Arc::new(MemoryStore::new());
    let dedup = DedupFilter::new(store.clone(), COLLECTION);
    dedup.refresh().await.unwrap();

    let extractor = Arc::new(
        ScriptedExtractor::new()
            .with_raw_only("a1", "<script>alert(1)</script><p>Hello</p>"),
    );

    let (entry, handle) = article_pipeline(store.clone(), dedup, extractor);
    entry.send(article("a1")).await.unwrap();
    // Identical redelivery; the stale dedup snapshot admits it and the
    // store's uniqueness constraint turns it into a duplicate outcome.
    entry.send(article("a1")).await.unwrap();
    drop(entry);
    handle.join().await;

    let documents = store.documents(COLLECTION);
    assert_eq!(documents.len(), 1);

    let document = &documents[0];
    assert_eq!(document["content"].as_str().unwrap(), "Hello");
    assert_eq!(document["summary"].as_str().unwrap(), "Hello");
    assert_eq!(
        document["published_at"].as_str().unwrap(),
        "2006-01-02T15:04:05Z"
    );
    assert!(document["insert_date"].is_string());
}

#[tokio::test]
async fn test_content_branch_skips_cleanup() {
    let store = Arc::new(MemoryStore::new());
    let dedup = DedupFilter::new(store.clone(), COLLECTION);

    let extractor =
        Arc::new(ScriptedExtractor::new().with_text("a1", "Extracted body. Second sentence."));

    let (entry, handle) = article_pipeline(store.clone(), dedup, extractor);
    entry.send(article("a1")).await.unwrap();
    drop(entry);
    handle.join().await;

    let document = store.document(COLLECTION, "a1").unwrap();
    assert_eq!(
        document["content"].as_str().unwrap(),
        "Extracted body. Second sentence."
    );
    assert!(!document["summary"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_one_failing_record_is_isolated() {
    let store = Arc::new(MemoryStore::new());
    let dedup = DedupFilter::new(store.clone(), COLLECTION);

    // a3 is not scripted, so its extraction fails; everyone else lands.
    let mut extractor = ScriptedExtractor::new();
    for key in ["a1", "a2", "a4", "a5"] {
        extractor = extractor.with_text(key, "Some body text.");
    }

    let (entry, handle) = article_pipeline(store.clone(), dedup, Arc::new(extractor));
    for key in ["a1", "a2", "a3", "a4", "a5"] {
        entry.send(article(key)).await.unwrap();
    }
    drop(entry);
    handle.join().await;

    assert_eq!(store.documents(COLLECTION).len(), 4);
    assert!(store.document(COLLECTION, "a3").is_none());
}

#[tokio::test]
async fn test_dedup_discards_known_keys_and_admits_stale_window_keys() {
    let store = Arc::new(MemoryStore::new());
    store.seed_key(COLLECTION, "old");

    let dedup = DedupFilter::new(store.clone(), COLLECTION);
    dedup.refresh().await.unwrap();

    // Written after the refresh: invisible to the snapshot, caught by the
    // store's uniqueness constraint instead.
    store.seed_key(COLLECTION, "late");

    let extractor = Arc::new(
        ScriptedExtractor::new()
            .with_text("old", "Stale body.")
            .with_text("late", "Late body.")
            .with_text("new", "New body."),
    );

    let (entry, handle) = article_pipeline(store.clone(), dedup, extractor);
    for key in ["old", "late", "new"] {
        entry.send(article(key)).await.unwrap();
    }
    drop(entry);
    handle.join().await;

    // "old" was discarded at admission, "late" became a sink duplicate,
    // "new" was written. The seeded rows are still single copies.
    let documents = store.documents(COLLECTION);
    assert_eq!(documents.len(), 3);
    assert!(store.document(COLLECTION, "late").unwrap().is_null()); // seeded row untouched
    assert!(store.document(COLLECTION, "new").unwrap().is_object());
}

#[tokio::test]
async fn test_named_zone_timestamp_reaches_store_normalized() {
    let store = Arc::new(MemoryStore::new());
    let dedup = DedupFilter::new(store.clone(), COLLECTION);
    let extractor = Arc::new(ScriptedExtractor::new().with_text("a1", "Body."));

    let (entry, handle) = article_pipeline(store.clone(), dedup, extractor);
    let mut record = article("a1");
    record.published = Some("Mon, 02 Jan 2006 15:04:05 EST".to_string());
    entry.send(record).await.unwrap();
    drop(entry);
    handle.join().await;

    let document = store.document(COLLECTION, "a1").unwrap();
    assert_eq!(
        document["published_at"].as_str().unwrap(),
        "2006-01-02T20:04:05Z"
    );
}

#[tokio::test]
async fn test_store_outage_drops_records_without_stopping_the_pipeline() {
    let store = Arc::new(MemoryStore::new());
    let dedup = DedupFilter::new(store.clone(), COLLECTION);
    let extractor = Arc::new(
        ScriptedExtractor::new()
            .with_text("a1", "Body one.")
            .with_text("a2", "Body two."),
    );

    store.set_failing(true);
    let (entry, handle) = article_pipeline(store.clone(), dedup, extractor);
    entry.send(article("a1")).await.unwrap();
    entry.send(article("a2")).await.unwrap();
    drop(entry);
    handle.join().await;

    // No local retry: both writes failed and were dropped, the workers
    // shut down cleanly.
    store.set_failing(false);
    assert!(store.documents(COLLECTION).is_empty());
}

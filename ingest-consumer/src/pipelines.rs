//! Graph wiring for the three pipelines. Channel names mirror the broker
//! topic names of the wider deployment; inside the process they are
//! plain hand-offs in one statically built graph.

use std::sync::Arc;

use ingest_common::record::{FeedArticle, MicroPost, SocialPost};
use ingest_common::store::DocumentStore;
use ingest_pipeline::dedup::DedupFilter;
use ingest_pipeline::enrich::article::{Extractor, FetchContent, FillContent, FillSummary};
use ingest_pipeline::enrich::social::{CleanComments, CleanText, ExtractHashtags, ExtractKeywords};
use ingest_pipeline::enrich::text::{EmojiScrub, FrequencyKeyworder, LeadingSummarizer};
use ingest_pipeline::error::GraphError;
use ingest_pipeline::graph::{PipelineGraph, PipelineHandle};
use ingest_pipeline::sink::IdempotentSink;
use tokio::sync::mpsc;

pub const FEED_COLLECTION: &str = "rss.articles";
pub const SOCIAL_COLLECTION: &str = "reddit.posts";
pub const MICRO_COLLECTION: &str = "twitter.posts";

pub struct PipelineSettings {
    pub stage_width: usize,
    pub channel_capacity: usize,
}

/// dedup → fetch (branching on extracted content) → cleanup → convergence
/// → summary → sink.
pub fn feed_pipeline(
    store: Arc<dyn DocumentStore>,
    dedup: Arc<DedupFilter>,
    extractor: Arc<dyn Extractor>,
    settings: &PipelineSettings,
) -> Result<(mpsc::Sender<FeedArticle>, PipelineHandle), GraphError> {
    let keyworder = Arc::new(FrequencyKeyworder::default());
    let summarizer = Arc::new(LeadingSummarizer::default());

    let mut graph = PipelineGraph::new("feed", settings.channel_capacity);
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
        .width(settings.stage_width);
    graph
        .stage(FillContent::new(keyworder, summarizer.clone()))
        .input(without_content)
        .ok_output(with_content)
        .width(settings.stage_width);
    graph
        .stage(FillSummary::new(summarizer))
        .input(with_content)
        .ok_output(full)
        .width(settings.stage_width);
    // Width 1: one key's writes must never race each other.
    graph
        .stage(IdempotentSink::new(store, FEED_COLLECTION))
        .input(full);

    let entry = graph.entry(feed);
    Ok((entry, graph.spawn()?))
}

/// dedup → clean comments → extract keywords → sink.
pub fn social_pipeline(
    store: Arc<dyn DocumentStore>,
    dedup: Arc<DedupFilter>,
    settings: &PipelineSettings,
) -> Result<(mpsc::Sender<SocialPost>, PipelineHandle), GraphError> {
    let mut graph = PipelineGraph::new("social", settings.channel_capacity);
    let posts = graph.channel("reddit");
    let filtered = graph.channel("reddit_filtered");
    let no_emoji = graph.channel("post_no_emoji");
    let final_post = graph.channel("final_post");

    graph.stage(dedup).input(posts).ok_output(filtered);
    graph
        .stage(CleanComments::new(Arc::new(EmojiScrub)))
        .input(filtered)
        .ok_output(no_emoji)
        .width(settings.stage_width);
    graph
        .stage(ExtractKeywords::new(Arc::new(FrequencyKeyworder::default())))
        .input(no_emoji)
        .ok_output(final_post)
        .width(settings.stage_width);
    graph
        .stage(IdempotentSink::new(store, SOCIAL_COLLECTION))
        .input(final_post);

    let entry = graph.entry(posts);
    Ok((entry, graph.spawn()?))
}

/// dedup → clean text → extract hashtags → sink.
pub fn micro_pipeline(
    store: Arc<dyn DocumentStore>,
    dedup: Arc<DedupFilter>,
    settings: &PipelineSettings,
) -> Result<(mpsc::Sender<MicroPost>, PipelineHandle), GraphError> {
    let mut graph = PipelineGraph::new("micro", settings.channel_capacity);
    let posts = graph.channel("twitter");
    let filtered = graph.channel("twitter_filtered");
    let no_emoji = graph.channel("tweet_no_emoji");
    let final_post = graph.channel("final_tweet");

    graph.stage(dedup).input(posts).ok_output(filtered);
    graph
        .stage(CleanText::new(Arc::new(EmojiScrub)))
        .input(filtered)
        .ok_output(no_emoji)
        .width(settings.stage_width);
    graph
        .stage(ExtractHashtags::new())
        .input(no_emoji)
        .ok_output(final_post)
        .width(settings.stage_width);
    graph
        .stage(IdempotentSink::new(store, MICRO_COLLECTION))
        .input(final_post);

    let entry = graph.entry(posts);
    Ok((entry, graph.spawn()?))
}

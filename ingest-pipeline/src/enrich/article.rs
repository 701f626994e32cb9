//! The fallback-chain enrichment stages for feed articles.
//!
//! `FetchContent` attempts primary extraction and branches: articles with
//! extracted text go straight to the "has content" channel, articles where
//! extraction came back empty carry their raw markup down the "needs
//! cleanup" channel. `FillContent` consumes that fallback branch and
//! reconverges with the success path, so everything past convergence has
//! non-empty content. `FillSummary` runs at convergence.

use std::sync::Arc;

use async_trait::async_trait;
use ingest_common::record::FeedArticle;
use thiserror::Error;
use tracing::info;

use crate::enrich::markup::strip_markup;
use crate::enrich::text::{Keyworder, Summarizer};
use crate::error::StageError;
use crate::stage::{Transform, Transformed};

/// Enumeration of errors for a primary content extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The recognized "nothing to extract" kind; logged quieter than an
    /// unexpected failure but dropped all the same.
    #[error("no content available at {0}")]
    Unavailable(String),
    #[error("extraction failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// What primary extraction produced: parsed text (possibly empty) plus the
/// raw markup to fall back on when parsing got nothing out.
pub struct Extraction {
    pub text: String,
    pub raw_html: String,
}

/// Fetches and parses an article body, the record's key as locator.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, locator: &str) -> Result<Extraction, ExtractError>;
}

pub struct FetchContent {
    extractor: Arc<dyn Extractor>,
    keyworder: Arc<dyn Keyworder>,
    summarizer: Arc<dyn Summarizer>,
}

impl FetchContent {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        keyworder: Arc<dyn Keyworder>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            extractor,
            keyworder,
            summarizer,
        })
    }
}

#[async_trait]
impl Transform<FeedArticle> for FetchContent {
    fn name(&self) -> &str {
        "fetch_content"
    }

    async fn apply(&self, mut article: FeedArticle) -> Result<Transformed<FeedArticle>, StageError> {
        let extraction = self
            .extractor
            .extract(&article.link)
            .await
            .map_err(|err| match err {
                ExtractError::Unavailable(locator) => {
                    StageError::Unavailable(format!("could not fetch content from {locator}"))
                }
                other => StageError::failed(other),
            })?;

        if extraction.text.trim().is_empty() {
            // Not a failure: hand the unparsed markup to the cleanup branch.
            article.content = Some(extraction.raw_html);
            info!("fetched raw markup only for {}", article.link);
            return Ok(Transformed::Degraded(article));
        }

        article.tags = Some(self.keyworder.keywords(&extraction.text));
        article.summary = Some(self.summarizer.summarize(&extraction.text));
        article.content = Some(extraction.text);
        info!("fetched content for {}", article.link);
        Ok(Transformed::Ok(article))
    }
}

/// Cleanup branch: strip the non-content markup out of the fallback
/// material and re-derive tags and summary from what remains.
pub struct FillContent {
    keyworder: Arc<dyn Keyworder>,
    summarizer: Arc<dyn Summarizer>,
}

impl FillContent {
    pub fn new(keyworder: Arc<dyn Keyworder>, summarizer: Arc<dyn Summarizer>) -> Arc<Self> {
        Arc::new(Self {
            keyworder,
            summarizer,
        })
    }
}

#[async_trait]
impl Transform<FeedArticle> for FillContent {
    fn name(&self) -> &str {
        "fill_content"
    }

    async fn apply(&self, mut article: FeedArticle) -> Result<Transformed<FeedArticle>, StageError> {
        let raw = article.content.take().unwrap_or_default();
        let text = strip_markup(&raw);
        if text.is_empty() {
            return Err(StageError::Unavailable(format!(
                "no text left after cleanup for {}",
                article.link
            )));
        }

        article.tags = Some(self.keyworder.keywords(&text));
        article.summary = Some(self.summarizer.summarize(&text));
        article.content = Some(text);
        info!("filled content for {}", article.link);
        Ok(Transformed::Ok(article))
    }
}

/// Convergence stage. An already-present summary may still carry markup
/// from the feed, so it is stripped unconditionally; a missing summary is
/// derived fresh from the content. The record moves on either way.
pub struct FillSummary {
    summarizer: Arc<dyn Summarizer>,
}

impl FillSummary {
    pub fn new(summarizer: Arc<dyn Summarizer>) -> Arc<Self> {
        Arc::new(Self { summarizer })
    }
}

#[async_trait]
impl Transform<FeedArticle> for FillSummary {
    fn name(&self) -> &str {
        "fill_summary"
    }

    async fn apply(&self, mut article: FeedArticle) -> Result<Transformed<FeedArticle>, StageError> {
        match article.summary.take() {
            Some(summary) => article.summary = Some(strip_markup(&summary)),
            None => {
                article.summary = article
                    .content
                    .as_deref()
                    .map(|content| self.summarizer.summarize(content));
            }
        }
        info!("summarized article {}", article.link);
        Ok(Transformed::Ok(article))
    }
}

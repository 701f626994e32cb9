//! Enrichment stages for the social-post and microblog chains: emoji
//! normalization, keyword extraction over comment threads, hashtag
//! extraction. Straight-line chains, no fallback branch.

use std::sync::Arc;

use async_trait::async_trait;
use ingest_common::record::{MicroPost, SocialPost};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::enrich::text::{Keyworder, TextCleaner};
use crate::error::StageError;
use crate::stage::{Transform, Transformed};

/// Runs the text cleaner over every comment of a social post.
pub struct CleanComments {
    cleaner: Arc<dyn TextCleaner>,
}

impl CleanComments {
    pub fn new(cleaner: Arc<dyn TextCleaner>) -> Arc<Self> {
        Arc::new(Self { cleaner })
    }
}

#[async_trait]
impl Transform<SocialPost> for CleanComments {
    fn name(&self) -> &str {
        "clean_comments"
    }

    async fn apply(&self, mut post: SocialPost) -> Result<Transformed<SocialPost>, StageError> {
        if let Some(comments) = &mut post.comments {
            for comment in comments.iter_mut() {
                comment.text = self.cleaner.clean(&comment.text);
            }
        }
        info!("cleaned comments of post {}", post.id);
        Ok(Transformed::Ok(post))
    }
}

/// Extracts ranked keywords out of a post's comment thread.
pub struct ExtractKeywords {
    keyworder: Arc<dyn Keyworder>,
}

impl ExtractKeywords {
    pub fn new(keyworder: Arc<dyn Keyworder>) -> Arc<Self> {
        Arc::new(Self { keyworder })
    }
}

#[async_trait]
impl Transform<SocialPost> for ExtractKeywords {
    fn name(&self) -> &str {
        "extract_keywords"
    }

    async fn apply(&self, mut post: SocialPost) -> Result<Transformed<SocialPost>, StageError> {
        let corpus = post
            .comments
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|comment| comment.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        post.keywords = Some(self.keyworder.keywords(&corpus));
        info!("extracted keywords for post {}", post.id);
        Ok(Transformed::Ok(post))
    }
}

/// Runs the text cleaner over a microblog post's body.
pub struct CleanText {
    cleaner: Arc<dyn TextCleaner>,
}

impl CleanText {
    pub fn new(cleaner: Arc<dyn TextCleaner>) -> Arc<Self> {
        Arc::new(Self { cleaner })
    }
}

#[async_trait]
impl Transform<MicroPost> for CleanText {
    fn name(&self) -> &str {
        "clean_text"
    }

    async fn apply(&self, mut post: MicroPost) -> Result<Transformed<MicroPost>, StageError> {
        post.text = self.cleaner.clean(&post.text);
        info!("cleaned text of post {}", post.post_id);
        Ok(Transformed::Ok(post))
    }
}

static HASHTAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());

/// Collects `#hashtags` from the post body.
#[derive(Default)]
pub struct ExtractHashtags;

impl ExtractHashtags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Transform<MicroPost> for ExtractHashtags {
    fn name(&self) -> &str {
        "extract_hashtags"
    }

    async fn apply(&self, mut post: MicroPost) -> Result<Transformed<MicroPost>, StageError> {
        let hashtags = HASHTAG_RE
            .captures_iter(&post.text)
            .map(|captures| captures[1].to_owned())
            .collect();
        post.hashtags = Some(hashtags);
        info!("extracted hashtags for post {}", post.post_id);
        Ok(Transformed::Ok(post))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::text::{EmojiScrub, FrequencyKeyworder};
    use ingest_common::record::PostComment;

    #[tokio::test]
    async fn test_comments_are_cleaned_in_place() {
        let stage = CleanComments::new(Arc::new(EmojiScrub));
        let post = SocialPost {
            id: "p1".to_string(),
            comments: Some(vec![PostComment {
                author: None,
                text: "nice \u{1F44D}".to_string(),
            }]),
            ..Default::default()
        };

        let Transformed::Ok(cleaned) = stage.apply(post).await.unwrap() else {
            panic!("expected forward");
        };
        assert_eq!(cleaned.comments.unwrap()[0].text, "nice ");
    }

    #[tokio::test]
    async fn test_post_without_comments_still_gets_keywords() {
        let stage = ExtractKeywords::new(Arc::new(FrequencyKeyworder::default()));
        let post = SocialPost {
            id: "p1".to_string(),
            ..Default::default()
        };

        let Transformed::Ok(tagged) = stage.apply(post).await.unwrap() else {
            panic!("expected forward");
        };
        assert_eq!(tagged.keywords, Some(vec![]));
    }

    #[tokio::test]
    async fn test_hashtags_are_extracted() {
        let stage = ExtractHashtags::new();
        let post = MicroPost {
            post_id: "t1".to_string(),
            text: "loving #rust and #kafka today".to_string(),
            ..Default::default()
        };

        let Transformed::Ok(tagged) = stage.apply(post).await.unwrap() else {
            panic!("expected forward");
        };
        assert_eq!(
            tagged.hashtags,
            Some(vec!["rust".to_string(), "kafka".to_string()])
        );
    }
}

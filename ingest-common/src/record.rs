use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::{self, TimestampError};

/// A record flowing through an enrichment pipeline.
///
/// `key` is the natural identity (article link, post id, message id): it is
/// stable across stages and backs both the dedup filter and the store's
/// uniqueness constraint. `normalize_timestamp` is called exactly once, by
/// the sink; no earlier stage may depend on the structured timestamp.
pub trait Record: Serialize + Send + Sync + 'static {
    fn key(&self) -> &str;

    fn normalize_timestamp(&mut self) -> Result<(), TimestampError>;
}

/// An article pulled from a syndication feed.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FeedArticle {
    pub feed_source: String,
    pub title: String,
    pub link: String,
    pub published: Option<String>,
    /// Structured time tuple as emitted by the feed parser, when it managed
    /// to parse `published` itself.
    pub published_parsed: Option<Vec<u32>>,
    pub author: Option<String>,
    pub authors: Option<Vec<String>>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub comments: Option<String>,
    pub content: Option<String>,
    pub source: Option<Value>,
    /// Normalized form of `published`, stamped by the sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Record for FeedArticle {
    fn key(&self) -> &str {
        &self.link
    }

    fn normalize_timestamp(&mut self) -> Result<(), TimestampError> {
        if let Some(parts) = &self.published_parsed {
            self.published_at = Some(time::from_parsed_tuple(parts)?);
        } else if let Some(raw) = &self.published {
            self.published_at = Some(time::parse_feed_timestamp(raw)?);
        }
        Ok(())
    }
}

/// One comment attached to a social post.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostComment {
    pub author: Option<String>,
    pub text: String,
}

/// A submission from a link-aggregation community, with its comment thread.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SocialPost {
    pub id: String,
    pub title: String,
    pub author: Option<Value>,
    pub created: Option<String>,
    pub score: i64,
    pub upvote_ratio: f64,
    pub community: Option<Value>,
    pub domain: Option<String>,
    pub url: Option<String>,
    pub comments: Option<Vec<PostComment>>,
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for SocialPost {
    fn key(&self) -> &str {
        &self.id
    }

    fn normalize_timestamp(&mut self) -> Result<(), TimestampError> {
        if let Some(raw) = &self.created {
            self.created_at = Some(time::parse_naive_utc(raw, "%Y-%m-%d %H:%M:%S")?);
        }
        Ok(())
    }
}

/// A microblog post with its engagement metrics.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MicroPost {
    pub post_id: String,
    pub text: String,
    pub created: Option<String>,
    pub metrics: HashMap<String, Value>,
    pub author: HashMap<String, Value>,
    pub trend: Option<String>,
    pub place: Option<String>,
    pub hashtags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for MicroPost {
    fn key(&self) -> &str {
        &self.post_id
    }

    fn normalize_timestamp(&mut self) -> Result<(), TimestampError> {
        if let Some(raw) = &self.created {
            self.created_at = Some(time::parse_with_offset(raw, "%Y-%m-%d %H:%M:%S%z")?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_article_prefers_parsed_tuple() {
        let mut article = FeedArticle {
            link: "https://example.com/a1".to_string(),
            published: Some("Mon, 02 Jan 2006 15:04:05 +0200".to_string()),
            published_parsed: Some(vec![2006, 1, 2, 15, 4, 5, 0, 2, 0]),
            ..Default::default()
        };

        article.normalize_timestamp().unwrap();
        assert_eq!(
            article.published_at.unwrap().to_rfc3339(),
            "2006-01-02T15:04:05+00:00"
        );
    }

    #[test]
    fn test_feed_article_without_timestamp_is_fine() {
        let mut article = FeedArticle {
            link: "https://example.com/a1".to_string(),
            ..Default::default()
        };

        article.normalize_timestamp().unwrap();
        assert!(article.published_at.is_none());
    }

    #[test]
    fn test_micro_post_offset_is_normalized_to_utc() {
        let mut post = MicroPost {
            post_id: "t1".to_string(),
            created: Some("2023-04-01 10:30:00+0100".to_string()),
            ..Default::default()
        };

        post.normalize_timestamp().unwrap();
        assert_eq!(
            post.created_at.unwrap().to_rfc3339(),
            "2023-04-01T09:30:00+00:00"
        );
    }

    #[test]
    fn test_unparseable_timestamp_is_an_error() {
        let mut post = SocialPost {
            id: "p1".to_string(),
            created: Some("yesterday".to_string()),
            ..Default::default()
        };

        assert!(post.normalize_timestamp().is_err());
    }
}

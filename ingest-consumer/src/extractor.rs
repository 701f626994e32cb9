use std::time::Duration;

use async_trait::async_trait;
use ingest_pipeline::enrich::article::{ExtractError, Extraction, Extractor};
use ingest_pipeline::enrich::markup::strip_markup;
use once_cell::sync::Lazy;
use regex::Regex;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:99.0) Gecko/20100101 Firefox/99.0";

static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p>").unwrap());

/// Primary extraction over HTTP: fetch the article page and pull the text
/// out of its paragraph elements. Pages whose paragraphs yield nothing
/// come back with empty `text` and the raw page for the cleanup branch.
pub struct HttpExtractor {
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, locator: &str) -> Result<Extraction, ExtractError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|err| ExtractError::Failed(Box::new(err)))?;

        let status = response.status();
        if status.is_client_error() {
            // The page is gone or never existed; the recognized kind.
            return Err(ExtractError::Unavailable(locator.to_owned()));
        }
        if !status.is_success() {
            return Err(ExtractError::Failed(
                format!("unexpected status {status} from {locator}").into(),
            ));
        }

        let raw_html = response
            .text()
            .await
            .map_err(|err| ExtractError::Failed(Box::new(err)))?;

        let text = PARAGRAPH_RE
            .captures_iter(&raw_html)
            .map(|captures| strip_markup(&captures[1]))
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(Extraction { text, raw_html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_extraction() {
        let html = r#"<html><body>
            <p>First <b>paragraph</b>.</p>
            <div>not a paragraph</div>
            <p></p>
            <p>Second paragraph.</p>
        </body></html>"#;

        let text = PARAGRAPH_RE
            .captures_iter(html)
            .map(|captures| strip_markup(&captures[1]))
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        assert_eq!(text, "First paragraph.\n\nSecond paragraph.");
    }
}

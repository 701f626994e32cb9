use once_cell::sync::Lazy;
use regex::Regex;

// Elements removed with their entire contents: scripts and styles never
// hold prose, and anchor/image elements are navigation chrome in the feed
// payloads this pipeline sees.
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").unwrap());
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*/?>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip non-content markup from a fragment of HTML, leaving plain text.
/// Good enough for fallback material; extraction quality beyond this is a
/// pluggable concern.
pub fn strip_markup(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = STYLE_RE.replace_all(&text, " ");
    let text = ANCHOR_RE.replace_all(&text, " ");
    let text = IMG_RE.replace_all(&text, " ");
    let text = TAG_RE.replace_all(&text, " ");
    let text = decode_entities(&text);
    WHITESPACE_RE.replace_all(&text, " ").trim().to_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_and_styles_are_removed_with_their_bodies() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><p>Hello</p><script type="text/javascript">alert("x")</script></body></html>"#;
        assert_eq!(strip_markup(html), "Hello");
    }

    #[test]
    fn test_anchors_and_images_are_removed() {
        let html = r#"<p>Read <a href="/more">more here</a> today<img src="x.png"/></p>"#;
        assert_eq!(strip_markup(html), "Read today");
    }

    #[test]
    fn test_entities_are_decoded_and_whitespace_collapsed() {
        let html = "<p>Fish&nbsp;&amp;\n\n  chips</p>";
        assert_eq!(strip_markup(html), "Fish & chips");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(strip_markup("already plain"), "already plain");
    }
}

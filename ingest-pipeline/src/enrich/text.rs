//! Pluggable pure text functions used by the enrichment stages.
//!
//! The defaults here are deliberately modest: the pipeline treats keyword
//! ranking, summarization and emoji handling as black boxes behind these
//! traits, and a deployment wanting real NLP swaps its own in.

/// Normalizes free text before further enrichment (emoji removal for the
/// social and microblog chains).
pub trait TextCleaner: Send + Sync {
    fn clean(&self, text: &str) -> String;
}

/// Ranks keywords out of a body of text.
pub trait Keyworder: Send + Sync {
    fn keywords(&self, text: &str) -> Vec<String>;
}

/// Derives a short summary from a body of text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str) -> String;
}

/// Drops emoji and pictographic symbols, keeping everything else.
#[derive(Default)]
pub struct EmojiScrub;

impl TextCleaner for EmojiScrub {
    fn clean(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if !is_pictographic(c) {
                out.push(c);
            }
        }
        out
    }
}

fn is_pictographic(c: char) -> bool {
    matches!(u32::from(c),
        0x1F000..=0x1FAFF   // mahjong tiles through symbols-extended, covers emoji proper
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF   // arrows & stars used as emoji
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
    )
}

/// Frequency-ranked keywords over stopword-filtered words.
pub struct FrequencyKeyworder {
    pub min_occurrences: usize,
    pub limit: usize,
}

impl Default for FrequencyKeyworder {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            limit: 10,
        }
    }
}

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "are", "as", "at", "be", "been", "but",
    "by", "can", "could", "for", "from", "had", "has", "have", "he", "her", "his", "i", "if",
    "in", "into", "is", "it", "its", "just", "more", "most", "not", "of", "on", "one", "or",
    "our", "out", "over", "she", "so", "some", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "to", "up", "was", "we", "were", "what", "when", "which",
    "who", "will", "with", "would", "you", "your",
];

impl Keyworder for FrequencyKeyworder {
    fn keywords(&self, text: &str) -> Vec<String> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 3)
            .map(|w| w.to_lowercase())
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
        {
            match counts.iter_mut().find(|(w, _)| *w == word) {
                Some((_, n)) => *n += 1,
                None => counts.push((word, 1)),
            }
        }

        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
            .into_iter()
            .filter(|(_, n)| *n >= self.min_occurrences)
            .take(self.limit)
            .map(|(w, _)| w)
            .collect()
    }
}

/// Takes the leading sentences of the text as its summary.
pub struct LeadingSummarizer {
    pub max_sentences: usize,
}

impl Default for LeadingSummarizer {
    fn default() -> Self {
        Self { max_sentences: 3 }
    }
}

impl Summarizer for LeadingSummarizer {
    fn summarize(&self, text: &str) -> String {
        let mut summary = String::new();
        let mut sentences = 0;
        for (i, c) in text.char_indices() {
            if matches!(c, '.' | '!' | '?') {
                sentences += 1;
                if sentences == self.max_sentences {
                    summary.push_str(&text[..=i]);
                    return summary.trim().to_owned();
                }
            }
        }
        text.trim().to_owned()
    }
}

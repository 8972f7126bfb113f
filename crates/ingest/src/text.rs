//! Whitespace/punctuation tokenization and token-budget truncation.

use std::sync::LazyLock;

use regex::Regex;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("token regex"));

/// Marker appended when text is truncated to a token budget.
const TRUNCATION_MARKER: &str = " ...";

/// Splits text into word and punctuation tokens.
pub fn tokenize_text(text: &str) -> Vec<&str> {
    TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect()
}

pub fn token_count(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

/// Splits text into chunks of at most `max_tokens` tokens each.
pub fn split_text_by_tokens(text: &str, max_tokens: usize) -> Vec<String> {
    let tokens = tokenize_text(text);
    tokens
        .chunks(max_tokens.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Returns `text` unchanged when it fits the budget; otherwise the first
/// `max_tokens` tokens joined with a trailing truncation marker.
pub fn summarize_text(text: &str, max_tokens: usize) -> String {
    let tokens = tokenize_text(text);
    if tokens.len() <= max_tokens {
        return text.to_string();
    }
    let mut out = tokens[..max_tokens].join(" ");
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_words_and_punctuation() {
        assert_eq!(tokenize_text("hello, world!"), vec!["hello", ",", "world", "!"]);
        assert_eq!(token_count("a b c"), 3);
        assert!(tokenize_text("   ").is_empty());
    }

    #[test]
    fn split_respects_chunk_size() {
        let chunks = split_text_by_tokens("one two three four five", 2);
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn summarize_is_identity_within_budget() {
        let text = "short text, untouched!";
        assert_eq!(summarize_text(text, token_count(text)), text);
        assert_eq!(summarize_text(text, 100), text);
    }

    #[test]
    fn summarize_truncates_with_marker_beyond_budget() {
        let text = "alpha beta gamma delta epsilon";
        let summary = summarize_text(text, 3);
        assert_eq!(summary, "alpha beta gamma ...");
        assert!(summary.len() < text.len());
    }
}

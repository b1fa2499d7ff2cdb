use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Words shorter than this are not indexed.
pub const MIN_TOKEN_CHARS: usize = 2;

static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid")
});

/// Distinct lowercase words of a document, as stored by the in-process index.
pub fn tokenize_text(text: &str) -> HashSet<String> {
    words(text).collect()
}

/// Query words in the order typed. Duplicates are kept.
pub fn tokenize_query(query: &str) -> Vec<String> {
    words(query).collect()
}

/// Normalizes a completion prefix the same way indexed words are normalized.
pub fn normalize_prefix(prefix: &str) -> String {
    prefix.trim().to_lowercase()
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
}

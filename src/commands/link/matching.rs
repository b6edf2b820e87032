use anyhow::{Context, Result};
use regex::Regex;

/// Minimum similarity for a fuzzy entity match to be accepted.
pub const FUZZY_MATCH_THRESHOLD: f64 = 0.85;

pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .trim()
        .replace('\'', "")
        .replace('-', " ")
}

pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-").replace('\'', "")
}

/// Case-insensitive similarity in [0, 1].
pub fn fuzzy_match_score(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// `<country>_<region>`, or `<country>_general` without a region.
pub fn origin_key(country: &str, region: Option<&str>) -> String {
    let country = country.trim().to_lowercase();
    match region.map(str::trim).filter(|value| !value.is_empty()) {
        Some(region) => format!("{country}_{}", region.to_lowercase()),
        None => format!("{country}_general"),
    }
}

/// Whole-phrase, case-insensitive matcher for a product or entity name.
/// A word boundary is only required on a side that ends in a word character.
pub fn phrase_pattern(name: &str) -> Result<Regex> {
    let name = name.trim();
    let is_word = |ch: Option<char>| ch.is_some_and(|ch| ch.is_alphanumeric() || ch == '_');
    let left = if is_word(name.chars().next()) {
        r"\b"
    } else {
        r"(?:^|[^\w])"
    };
    let right = if is_word(name.chars().next_back()) {
        r"\b"
    } else {
        r"(?:[^\w]|$)"
    };

    Regex::new(&format!("(?i){left}{}{right}", regex::escape(name)))
        .with_context(|| format!("failed to compile name pattern for {name}"))
}

/// Maps sentiment in [-1, 1] onto a 1-5 rating with one decimal.
pub fn sentiment_to_rating(sentiment: f64) -> f64 {
    let rating = (sentiment.clamp(-1.0, 1.0) + 1.0) * 2.0 + 1.0;
    (rating * 10.0).round() / 10.0
}

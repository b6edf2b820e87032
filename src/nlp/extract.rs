use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{ExtractedFlavor, ExtractedRoaster, Extraction, Intensity};
use crate::util::{round2, title_case, truncate_chars};

use super::lexicon::{
    BREW_METHODS, DRINK_KEYWORDS, INTENSITY_MARKERS, KNOWN_ROASTERS, ORIGIN_TERMS,
    PROCESS_METHODS, STOPWORDS, flavor_keywords,
};
use super::sentiment::{polarity, tokenize};

pub const MAX_CONTEXT_CHARS: usize = 200;
pub const MIN_POST_CHARS: usize = 10;
pub const MAX_KEYWORDS: usize = 20;
const MAX_PRIMARY_FLAVORS: usize = 3;
const BASE_FLAVOR_CONFIDENCE: f64 = 0.6;
const CONTEXT_FLAVOR_CONFIDENCE: f64 = 0.75;
const CONTEXT_MIN_CHARS: usize = 20;
const STRONG_SENTIMENT: f64 = 0.5;
const STRONG_SENTIMENT_BONUS: f64 = 0.1;

/// A lexicon surface form with its compiled whole-word matcher.
#[derive(Debug)]
struct Term {
    surface: &'static str,
    canonical: &'static str,
    pattern: Regex,
}

impl Term {
    fn new(surface: &'static str, canonical: &'static str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(surface)))
            .with_context(|| format!("failed to compile lexicon pattern for {surface}"))?;
        Ok(Self {
            surface,
            canonical,
            pattern,
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

fn compile_terms(pairs: impl IntoIterator<Item = (&'static str, &'static str)>) -> Result<Vec<Term>> {
    pairs
        .into_iter()
        .map(|(surface, canonical)| Term::new(surface, canonical))
        .collect()
}

/// Output of running the extractor over one raw post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostAnalysis {
    pub cleaned_text: String,
    pub sentiment_score: f64,
    pub word_count: usize,
    pub extraction: Extraction,
}

#[derive(Debug)]
pub struct Extractor {
    url_pattern: Regex,
    whitespace_pattern: Regex,
    price_pattern: Regex,
    roaster_name_pattern: Regex,
    flavors: Vec<Term>,
    roasters: Vec<Term>,
    origins: Vec<Term>,
    brew_methods: Vec<Term>,
    process_methods: Vec<Term>,
    drinks: Vec<Term>,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            url_pattern: Regex::new(r"https?://\S+|www\.\S+")
                .context("failed to compile url pattern")?,
            whitespace_pattern: Regex::new(r"\s+").context("failed to compile whitespace pattern")?,
            price_pattern: Regex::new(r"\$\s?(\d+(?:\.\d{1,2})?)")
                .context("failed to compile price pattern")?,
            roaster_name_pattern: Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){1,2})\s+Coffee\b")
                .context("failed to compile roaster name pattern")?,
            flavors: compile_terms(flavor_keywords().into_iter().map(|term| (term, term)))?,
            roasters: compile_terms(KNOWN_ROASTERS.iter().map(|name| (*name, *name)))?,
            origins: compile_terms(ORIGIN_TERMS.iter().copied())?,
            brew_methods: compile_terms(BREW_METHODS.iter().map(|method| (*method, *method)))?,
            process_methods: compile_terms(PROCESS_METHODS.iter().copied())?,
            drinks: compile_terms(DRINK_KEYWORDS.iter().map(|drink| (*drink, *drink)))?,
        })
    }

    /// Strips URLs and collapses whitespace.
    pub fn clean_text(&self, text: &str) -> String {
        let without_urls = self.url_pattern.replace_all(text, "");
        self.whitespace_pattern
            .replace_all(&without_urls, " ")
            .trim()
            .to_string()
    }

    /// Returns `None` when the combined title and body are too short to analyze.
    pub fn analyze_post(&self, title: &str, body: &str) -> Option<PostAnalysis> {
        let text = format!("{title}\n{body}");
        let text = text.trim();
        if text.chars().count() < MIN_POST_CHARS {
            return None;
        }

        let cleaned_text = self.clean_text(text);
        let sentiment_score = polarity(&cleaned_text);
        let word_count = cleaned_text.split_whitespace().count();

        let extraction = Extraction {
            flavors: self.extract_flavors(&cleaned_text),
            // Capitalization matters for the "<Name> Coffee" pattern.
            roasters: self.extract_roasters(text),
            origins: self.extract_origins(&cleaned_text),
            brew_methods: self.extract_brew_methods(&cleaned_text),
            process_methods: self.extract_process_methods(&cleaned_text),
            price: self.extract_price(text),
            keywords: extract_keywords(&cleaned_text, MAX_KEYWORDS),
        };

        Some(PostAnalysis {
            cleaned_text,
            sentiment_score,
            word_count,
            extraction,
        })
    }

    pub fn extract_flavors(&self, text: &str) -> Vec<ExtractedFlavor> {
        let sentences = split_sentences(text);
        let mut flavors = Vec::<ExtractedFlavor>::new();

        for term in &self.flavors {
            if !term.matches(text) {
                continue;
            }

            let context = sentences
                .iter()
                .find(|sentence| term.matches(sentence))
                .copied()
                .unwrap_or_default();

            let intensity = intensity_for(context);
            let sentiment = if context.is_empty() {
                0.0
            } else {
                polarity(context)
            };

            let mut confidence = BASE_FLAVOR_CONFIDENCE;
            if context.chars().count() > CONTEXT_MIN_CHARS {
                confidence = CONTEXT_FLAVOR_CONFIDENCE;
            }
            if sentiment.abs() > STRONG_SENTIMENT {
                confidence = (confidence + STRONG_SENTIMENT_BONUS).min(1.0);
            }

            flavors.push(ExtractedFlavor {
                term: term.surface.to_string(),
                intensity,
                confidence: round2(confidence),
                sentiment: round2(sentiment),
                context: truncate_chars(context, MAX_CONTEXT_CHARS),
                is_primary: false,
            });
        }

        flavors.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        for flavor in flavors.iter_mut().take(MAX_PRIMARY_FLAVORS) {
            flavor.is_primary = true;
        }

        flavors
    }

    pub fn extract_roasters(&self, text: &str) -> Vec<ExtractedRoaster> {
        let mut roasters = Vec::<ExtractedRoaster>::new();

        for term in &self.roasters {
            if !term.matches(text) {
                continue;
            }

            let context = text
                .split('.')
                .find(|segment| term.matches(segment))
                .map(str::trim)
                .unwrap_or_default();

            roasters.push(ExtractedRoaster {
                name: title_case(term.surface),
                context: truncate_chars(context, MAX_CONTEXT_CHARS),
            });
        }

        for captures in self.roaster_name_pattern.captures_iter(text) {
            let Some(name) = captures.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let already_found = roasters
                .iter()
                .any(|roaster| roaster.name.eq_ignore_ascii_case(name));
            if !already_found {
                roasters.push(ExtractedRoaster {
                    name: name.to_string(),
                    context: String::new(),
                });
            }
        }

        roasters
    }

    /// Canonical country names, deduplicated in first-seen lexicon order.
    pub fn extract_origins(&self, text: &str) -> Vec<String> {
        canonical_matches(&self.origins, text)
    }

    pub fn extract_brew_methods(&self, text: &str) -> Vec<String> {
        canonical_matches(&self.brew_methods, text)
    }

    pub fn extract_process_methods(&self, text: &str) -> Vec<String> {
        canonical_matches(&self.process_methods, text)
    }

    pub fn extract_drink_mentions(&self, text: &str) -> Vec<String> {
        canonical_matches(&self.drinks, text)
    }

    /// First dollar amount in the text.
    pub fn extract_price(&self, text: &str) -> Option<f64> {
        self.price_pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    }
}

fn canonical_matches(terms: &[Term], text: &str) -> Vec<String> {
    let mut found = Vec::<String>::new();
    for term in terms {
        if term.matches(text) && !found.iter().any(|value| value == term.canonical) {
            found.push(term.canonical.to_string());
        }
    }
    found
}

fn intensity_for(context: &str) -> Intensity {
    if context.is_empty() {
        return Intensity::default();
    }

    let tokens = tokenize(context);
    let mut intensity = Intensity::default();
    for (level, markers) in INTENSITY_MARKERS {
        if markers
            .iter()
            .any(|marker| tokens.iter().any(|token| token == marker))
        {
            intensity = *level;
        }
    }

    intensity
}

/// Splits on sentence terminators and line breaks; returned slices are trimmed.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (index, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?' | '\n') {
            let end = index + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() && sentence.chars().any(char::is_alphanumeric) {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() && tail.chars().any(char::is_alphanumeric) {
        sentences.push(tail);
    }

    sentences
}

/// Naive singularization standing in for lemmatization.
fn lemma(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Most frequent non-stopword lemmas; ties keep first-seen order.
pub fn extract_keywords(text: &str, top_n: usize) -> Vec<String> {
    let mut counts = HashMap::<String, (usize, usize)>::new();

    for (position, token) in tokenize(text).into_iter().enumerate() {
        if token.chars().count() < 3
            || !token.chars().all(char::is_alphabetic)
            || STOPWORDS.contains(&token.as_str())
        {
            continue;
        }

        let entry = counts.entry(lemma(&token)).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
        count_b.cmp(count_a).then(first_a.cmp(first_b))
    });

    ranked
        .into_iter()
        .take(top_n)
        .map(|(word, _)| word)
        .collect()
}

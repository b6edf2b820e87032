use super::lexicon::{INTENSIFIERS, NEGATIONS, SENTIMENT_WORDS};

/// How many preceding tokens a negation reaches.
const NEGATION_WINDOW: usize = 3;
const NEGATION_FACTOR: f64 = -0.5;

/// Lowercased word tokens; apostrophes stay inside words so contractions survive.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|token| token.trim_matches('\''))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn lookup(table: &[(&str, f64)], word: &str) -> Option<f64> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == word)
        .map(|(_, value)| *value)
}

/// Average polarity of sentiment-bearing words, in [-1, 1]; 0.0 when none occur.
pub fn polarity(text: &str) -> f64 {
    let tokens = tokenize(text);
    let mut scores = Vec::<f64>::new();

    for (index, token) in tokens.iter().enumerate() {
        let Some(base) = lookup(SENTIMENT_WORDS, token) else {
            continue;
        };

        let mut score = base;

        if index > 0
            && let Some(multiplier) = lookup(INTENSIFIERS, &tokens[index - 1])
        {
            score *= multiplier;
        }

        let window_start = index.saturating_sub(NEGATION_WINDOW);
        let negated = tokens[window_start..index]
            .iter()
            .any(|previous| NEGATIONS.contains(&previous.as_str()));
        if negated {
            score *= NEGATION_FACTOR;
        }

        scores.push(score.clamp(-1.0, 1.0));
    }

    if scores.is_empty() {
        return 0.0;
    }

    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    mean.clamp(-1.0, 1.0)
}

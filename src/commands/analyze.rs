use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::info;

use crate::cli::AnalyzeArgs;
use crate::model::Discussion;
use crate::util::{list_json_files, read_json};

const HIGH_QUALITY_SCORE: i64 = 50;
const MIN_DISCUSSIONS: usize = 500;
const MIN_HIGH_QUALITY_SHARE: f64 = 0.3;
const MIN_AVG_COMMENTS: f64 = 5.0;
const MIN_BODY_TEXT_SHARE: f64 = 0.5;
const TOP_DRINKS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    LowCount,
    LowEngagement,
    FewComments,
    SparseBodyText,
}

impl QualityIssue {
    fn message(self) -> &'static str {
        match self {
            Self::LowCount => "Low total count: consider expanding search queries or subreddits",
            Self::LowEngagement => "Low engagement: many posts have low scores",
            Self::FewComments => "Few comments: posts with more discussion would help",
            Self::SparseBodyText => "Many posts lack body text: less context for extraction",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotQuality {
    pub discussions: usize,
    pub comments: usize,
    pub min_score: i64,
    pub max_score: i64,
    pub avg_score: f64,
    pub median_score: i64,
    pub high_quality: usize,
    pub with_text: usize,
    pub with_comments: usize,
    pub unique_drinks: usize,
    pub drink_mentions: usize,
    pub top_drinks: Vec<(String, usize)>,
    /// Oldest and newest post dates; `None` when no timestamp parses.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Sorted by count descending, then name.
    pub subreddits: Vec<(String, usize)>,
    pub issues: Vec<QualityIssue>,
}

impl SnapshotQuality {
    fn share(&self, count: usize) -> f64 {
        count as f64 / self.discussions as f64
    }

    pub fn avg_comments(&self) -> f64 {
        self.share(self.comments)
    }
}

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let input = match args.input {
        Some(input) => input,
        None => newest_reddit_snapshot(&args.data_root)?,
    };
    info!(path = %input.display(), "analyzing discussion snapshot");

    let discussions: Vec<Discussion> = read_json(&input)?;
    let quality = analyze_discussions(&discussions)?;

    let mut output = io::BufWriter::new(io::stdout().lock());
    write_quality_report(&mut output, &quality)?;
    output.flush().context("failed to flush report")?;
    Ok(())
}

fn newest_reddit_snapshot(data_root: &Path) -> Result<PathBuf> {
    let reddit_dir = data_root.join("raw").join("reddit");
    match list_json_files(&reddit_dir)?.pop() {
        Some(path) => Ok(path),
        None => bail!("no discussion snapshots found in {}", reddit_dir.display()),
    }
}

fn ranked(counts: HashMap<&str, usize>) -> Vec<(String, usize)> {
    let mut ranked = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

/// RFC 3339, or a naive ISO timestamp without an offset.
fn post_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

pub fn analyze_discussions(discussions: &[Discussion]) -> Result<SnapshotQuality> {
    if discussions.is_empty() {
        bail!("snapshot contains no discussions");
    }

    let mut scores = discussions.iter().map(|d| d.score).collect::<Vec<_>>();
    scores.sort_unstable();
    let total = discussions.len();

    let mut drink_counts = HashMap::<&str, usize>::new();
    let mut subreddit_counts = HashMap::<&str, usize>::new();
    for discussion in discussions {
        for drink in &discussion.mentioned_drinks {
            *drink_counts.entry(drink.as_str()).or_default() += 1;
        }
        *subreddit_counts.entry(discussion.subreddit.as_str()).or_default() += 1;
    }

    let dates = discussions
        .iter()
        .filter_map(|d| post_date(&d.created_utc))
        .collect::<Vec<_>>();
    let date_range = dates
        .iter()
        .min()
        .copied()
        .zip(dates.iter().max().copied());

    let drink_mentions = drink_counts.values().sum();
    let unique_drinks = drink_counts.len();
    let mut top_drinks = ranked(drink_counts);
    top_drinks.truncate(TOP_DRINKS);

    let mut quality = SnapshotQuality {
        discussions: total,
        comments: discussions.iter().map(|d| d.top_comments.len()).sum(),
        min_score: scores[0],
        max_score: scores[total - 1],
        avg_score: scores.iter().sum::<i64>() as f64 / total as f64,
        median_score: scores[total / 2],
        high_quality: scores.iter().filter(|score| **score >= HIGH_QUALITY_SCORE).count(),
        with_text: discussions.iter().filter(|d| !d.text.is_empty()).count(),
        with_comments: discussions.iter().filter(|d| !d.top_comments.is_empty()).count(),
        unique_drinks,
        drink_mentions,
        top_drinks,
        date_range,
        subreddits: ranked(subreddit_counts),
        issues: Vec::new(),
    };

    if quality.discussions < MIN_DISCUSSIONS {
        quality.issues.push(QualityIssue::LowCount);
    }
    if quality.share(quality.high_quality) < MIN_HIGH_QUALITY_SHARE {
        quality.issues.push(QualityIssue::LowEngagement);
    }
    if quality.avg_comments() < MIN_AVG_COMMENTS {
        quality.issues.push(QualityIssue::FewComments);
    }
    if quality.share(quality.with_text) < MIN_BODY_TEXT_SHARE {
        quality.issues.push(QualityIssue::SparseBodyText);
    }

    Ok(quality)
}

pub fn write_quality_report(out: &mut impl Write, quality: &SnapshotQuality) -> Result<()> {
    let percent = |count: usize| quality.share(count) * 100.0;

    writeln!(out, "Discussion Data Quality Report")?;
    writeln!(out, "{}", "=".repeat(60))?;

    writeln!(out, "\n1. Basic Statistics:")?;
    writeln!(out, "   Total discussions: {}", quality.discussions)?;
    writeln!(out, "   Total comments: {}", quality.comments)?;

    writeln!(out, "\n2. Engagement Metrics:")?;
    writeln!(out, "   Min score: {}", quality.min_score)?;
    writeln!(out, "   Max score: {}", quality.max_score)?;
    writeln!(out, "   Avg score: {:.1}", quality.avg_score)?;
    writeln!(out, "   Median score: {}", quality.median_score)?;
    writeln!(
        out,
        "   High-quality posts (score >= {HIGH_QUALITY_SCORE}): {} ({:.1}%)",
        quality.high_quality,
        percent(quality.high_quality)
    )?;

    writeln!(out, "\n3. Content Richness:")?;
    writeln!(out, "   Posts with body text: {} ({:.1}%)", quality.with_text, percent(quality.with_text))?;
    writeln!(
        out,
        "   Posts with comments: {} ({:.1}%)",
        quality.with_comments,
        percent(quality.with_comments)
    )?;
    writeln!(out, "   Avg comments per post: {:.1}", quality.avg_comments())?;

    writeln!(out, "\n4. Drink Mention Analysis:")?;
    writeln!(out, "   Unique drinks mentioned: {}", quality.unique_drinks)?;
    writeln!(out, "   Total drink mentions: {}", quality.drink_mentions)?;
    writeln!(
        out,
        "   Avg mentions per post: {:.1}",
        quality.share(quality.drink_mentions)
    )?;
    writeln!(out, "\n   Top {TOP_DRINKS} mentioned drinks:")?;
    for (drink, count) in &quality.top_drinks {
        writeln!(out, "      {drink}: {count}")?;
    }

    writeln!(out, "\n5. Temporal Distribution:")?;
    match quality.date_range {
        Some((oldest, newest)) => {
            writeln!(out, "   Oldest post: {oldest}")?;
            writeln!(out, "   Newest post: {newest}")?;
            writeln!(out, "   Date range: {} days", (newest - oldest).num_days())?;
        }
        None => writeln!(out, "   No parseable post timestamps")?,
    }

    writeln!(out, "\n6. Subreddit Distribution:")?;
    for (subreddit, count) in &quality.subreddits {
        writeln!(out, "   r/{subreddit}: {count} ({:.1}%)", percent(*count))?;
    }

    writeln!(out, "\n7. Data Quality Assessment:")?;
    if quality.issues.is_empty() {
        writeln!(out, "   Data quality looks good")?;
    }
    for issue in &quality.issues {
        writeln!(out, "   [!] {}", issue.message())?;
    }
    writeln!(out, "\n{}", "=".repeat(60))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscussionComment;

    fn discussion(id: &str, subreddit: &str, score: i64, text: &str, created: &str, drinks: &[&str]) -> Discussion {
        Discussion {
            post_id: id.to_string(),
            title: format!("post {id}"),
            text: text.to_string(),
            author: "brewer".to_string(),
            score,
            upvote_ratio: 1.0,
            num_comments: 0,
            created_utc: created.to_string(),
            url: String::new(),
            subreddit: subreddit.to_string(),
            top_comments: Vec::new(),
            flair: None,
            scraped_date: "2026-10-19".to_string(),
            mentioned_drinks: drinks.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn quality_report_summarizes_snapshot() {
        let mut first = discussion("a", "Coffee", 120, "body", "2026-09-01T10:00:00Z", &["latte", "mocha"]);
        first.top_comments = (0..6)
            .map(|index| DiscussionComment {
                body: format!("comment {index}"),
                score: 3,
                created_utc: String::new(),
            })
            .collect();

        let discussions = vec![
            first,
            discussion("b", "starbucks", 4, "", "2026-09-11T08:00:00Z", &["latte"]),
            discussion("c", "Coffee", 60, "", "not a date", &[]),
        ];

        let quality = analyze_discussions(&discussions).expect("analysis");
        assert_eq!(quality.discussions, 3);
        assert_eq!(quality.comments, 6);
        assert_eq!((quality.min_score, quality.max_score, quality.median_score), (4, 120, 60));
        assert_eq!(quality.high_quality, 2);
        assert_eq!(quality.with_text, 1);
        assert_eq!(quality.with_comments, 1);
        assert_eq!(quality.unique_drinks, 2);
        assert_eq!(quality.drink_mentions, 3);
        assert_eq!(quality.top_drinks[0], ("latte".to_string(), 2));
        assert_eq!(
            quality.subreddits,
            vec![("Coffee".to_string(), 2), ("starbucks".to_string(), 1)]
        );

        let (oldest, newest) = quality.date_range.expect("date range");
        assert_eq!((newest - oldest).num_days(), 10);

        assert_eq!(
            quality.issues,
            vec![QualityIssue::LowCount, QualityIssue::FewComments, QualityIssue::SparseBodyText]
        );

        let mut rendered = Vec::new();
        write_quality_report(&mut rendered, &quality).expect("render");
        let rendered = String::from_utf8(rendered).expect("utf8");
        assert!(rendered.contains("Date range: 10 days"));
        assert!(rendered.contains("r/Coffee: 2 (66.7%)"));
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        assert!(analyze_discussions(&[]).is_err());
    }

    #[test]
    fn naive_timestamps_still_yield_a_date_range() {
        let discussions = vec![
            discussion("a", "coffee", 5, "latte", "2026-09-05T12:30:00.123456", &[]),
            discussion("b", "coffee", 7, "mocha", "2026-09-08T08:00:00", &[]),
            discussion("c", "coffee", 9, "drip", "2026-09-10T09:15:00Z", &[]),
        ];
        let quality = analyze_discussions(&discussions).expect("analysis");

        let (oldest, newest) = quality.date_range.expect("date range");
        assert_eq!(oldest, NaiveDate::from_ymd_opt(2026, 9, 5).expect("date"));
        assert_eq!(newest, NaiveDate::from_ymd_opt(2026, 9, 10).expect("date"));
    }
}

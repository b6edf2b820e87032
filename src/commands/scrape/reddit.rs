use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::model::{Discussion, DiscussionComment};
use crate::nlp::Extractor;

use super::http::Fetcher;

pub const REDDIT_BASE_URL: &str = "https://www.reddit.com";

pub const TARGET_SUBREDDITS: &[&str] = &[
    "Coffee",
    "starbucks",
    "cafe",
    "espresso",
    "barista",
    "CoffeeGoneWild",
];
pub const DEFAULT_HOT_SUBREDDIT: &str = "Coffee";

pub const SEARCH_QUERIES: &[&str] = &[
    "recommend drink",
    "best order",
    "favorite customization",
    "coffee suggestion",
    "what should I get",
    "drink recommendation",
    "favorite drink",
    "best coffee",
    "cold brew recommendation",
    "latte suggestion",
    "iced coffee order",
    "sweet drink recommendation",
];

const QUERIES_PER_SUBREDDIT: usize = 3;
const SEARCH_LIMIT: usize = 50;
const MIN_SEARCH_SCORE: i64 = 5;
const MIN_SEARCH_COMMENTS: i64 = 3;

const TOP_LIMIT: usize = 100;
const MIN_TOP_SCORE: i64 = 10;
const TOP_TITLE_KEYWORDS: &[&str] = &["recommend", "favorite", "best", "order", "suggestion", "drink"];

const MAX_COMMENTS: usize = 10;
const MIN_COMMENT_SCORE: i64 = 2;
const MAX_PAGE_SIZE: usize = 100;
const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: f64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub link_flair_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RedditComment {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscussionStats {
    pub total_posts: usize,
    pub total_comments: usize,
    pub avg_score: f64,
    pub subreddit_breakdown: BTreeMap<String, usize>,
    pub top_mentioned_drinks: Vec<(String, usize)>,
}

fn subreddit_url(subreddit: &str, listing: &str) -> Result<Url> {
    let raw = format!("{REDDIT_BASE_URL}/r/{subreddit}/{listing}.json");
    Url::parse(&raw).with_context(|| format!("invalid subreddit url: {raw}"))
}

pub fn search_url(subreddit: &str, query: &str) -> Result<String> {
    let mut url = subreddit_url(subreddit, "search")?;
    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("restrict_sr", "1")
        .append_pair("t", "year")
        .append_pair("limit", &SEARCH_LIMIT.to_string());
    Ok(url.to_string())
}

pub fn top_url(subreddit: &str) -> Result<String> {
    let mut url = subreddit_url(subreddit, "top")?;
    url.query_pairs_mut()
        .append_pair("t", "year")
        .append_pair("limit", &TOP_LIMIT.to_string());
    Ok(url.to_string())
}

pub fn hot_url(subreddit: &str, limit: usize, after: Option<&str>) -> Result<String> {
    let mut url = subreddit_url(subreddit, "hot")?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("limit", &limit.min(MAX_PAGE_SIZE).to_string());
        if let Some(after) = after {
            pairs.append_pair("after", after);
        }
    }
    Ok(url.to_string())
}

pub fn comments_url(post_id: &str) -> Result<String> {
    let raw = format!("{REDDIT_BASE_URL}/comments/{post_id}.json");
    let mut url = Url::parse(&raw).with_context(|| format!("invalid comments url: {raw}"))?;
    url.query_pairs_mut()
        .append_pair("limit", &MAX_COMMENTS.to_string())
        .append_pair("depth", "1")
        .append_pair("sort", "top");
    Ok(url.to_string())
}

/// Epoch seconds as an RFC 3339 UTC timestamp; out-of-range values yield an empty string.
fn epoch_to_rfc3339(seconds: f64) -> String {
    DateTime::from_timestamp(seconds as i64, 0)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn passes_search_filter(post: &RedditPost) -> bool {
    post.score >= MIN_SEARCH_SCORE && post.num_comments >= MIN_SEARCH_COMMENTS
}

fn passes_top_filter(post: &RedditPost) -> bool {
    let title = post.title.to_lowercase();
    post.score >= MIN_TOP_SCORE && TOP_TITLE_KEYWORDS.iter().any(|keyword| title.contains(keyword))
}

/// Keeps the first occurrence of each post id.
fn dedup_discussions(discussions: Vec<Discussion>) -> Vec<Discussion> {
    let mut seen = HashSet::<String>::new();
    discussions
        .into_iter()
        .filter(|discussion| seen.insert(discussion.post_id.clone()))
        .collect()
}

pub struct RedditScraper<'a> {
    fetcher: &'a dyn Fetcher,
    extractor: &'a Extractor,
    scraped_date: String,
}

impl<'a> RedditScraper<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, extractor: &'a Extractor, scraped_date: String) -> Self {
        Self {
            fetcher,
            extractor,
            scraped_date,
        }
    }

    fn fetch_listing(&self, url: &str) -> Result<(Vec<RedditPost>, Option<String>)> {
        let body = self.fetcher.fetch_text(url)?;
        let listing: Listing =
            serde_json::from_str(&body).with_context(|| format!("invalid listing json from {url}"))?;

        let mut posts = Vec::new();
        for thing in listing.data.children {
            if thing.kind != "t3" {
                continue;
            }
            match serde_json::from_value::<RedditPost>(thing.data) {
                Ok(post) => posts.push(post),
                Err(err) => warn!(url, error = %err, "skipping malformed post"),
            }
        }

        Ok((posts, listing.data.after))
    }

    /// Top-level comments with score >= 2, at most ten.
    pub fn fetch_top_comments(&self, post_id: &str) -> Result<Vec<DiscussionComment>> {
        let url = comments_url(post_id)?;
        let body = self.fetcher.fetch_text(&url)?;
        let listings: Vec<Listing> =
            serde_json::from_str(&body).with_context(|| format!("invalid comments json from {url}"))?;

        let Some(comment_listing) = listings.into_iter().nth(1) else {
            return Ok(Vec::new());
        };

        let comments = comment_listing
            .data
            .children
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .take(MAX_COMMENTS)
            .filter_map(|thing| serde_json::from_value::<RedditComment>(thing.data).ok())
            .filter_map(|comment| {
                let body = comment.body?;
                (comment.score >= MIN_COMMENT_SCORE).then(|| DiscussionComment {
                    body,
                    score: comment.score,
                    created_utc: epoch_to_rfc3339(comment.created_utc),
                })
            })
            .collect();

        Ok(comments)
    }

    pub fn build_discussion(&self, post: RedditPost, subreddit: &str) -> Discussion {
        let top_comments = match self.fetch_top_comments(&post.id) {
            Ok(comments) => comments,
            Err(err) => {
                warn!(post_id = %post.id, error = %err, "failed to fetch comments");
                Vec::new()
            }
        };

        let mut mention_text = format!("{} {}", post.title, post.selftext);
        for comment in &top_comments {
            mention_text.push(' ');
            mention_text.push_str(&comment.body);
        }
        let mentioned_drinks = self.extractor.extract_drink_mentions(&mention_text);

        Discussion {
            url: format!("https://reddit.com{}", post.permalink),
            author: post
                .author
                .filter(|author| !author.is_empty())
                .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            created_utc: epoch_to_rfc3339(post.created_utc),
            post_id: post.id,
            title: post.title,
            text: post.selftext,
            score: post.score,
            upvote_ratio: post.upvote_ratio,
            num_comments: post.num_comments,
            subreddit: subreddit.to_string(),
            top_comments,
            flair: post.link_flair_text.filter(|flair| !flair.is_empty()),
            scraped_date: self.scraped_date.clone(),
            mentioned_drinks,
        }
    }

    /// Recommendation searches plus qualifying top posts of the year.
    pub fn scrape_subreddit(&self, subreddit: &str) -> Result<Vec<Discussion>> {
        info!(subreddit, "scraping subreddit");
        let mut discussions = Vec::new();
        let mut seen = HashSet::<String>::new();

        for query in SEARCH_QUERIES.iter().take(QUERIES_PER_SUBREDDIT) {
            info!(subreddit, query, "searching");
            let (posts, _) = self.fetch_listing(&search_url(subreddit, query)?)?;
            for post in posts {
                if passes_search_filter(&post) && seen.insert(post.id.clone()) {
                    discussions.push(self.build_discussion(post, subreddit));
                }
            }
        }

        let (posts, _) = self.fetch_listing(&top_url(subreddit)?)?;
        for post in posts {
            if passes_top_filter(&post) && seen.insert(post.id.clone()) {
                discussions.push(self.build_discussion(post, subreddit));
            }
        }

        info!(subreddit, collected = discussions.len(), "subreddit done");
        Ok(discussions)
    }

    /// Failing subreddits are logged and skipped.
    pub fn scrape_all(&self, subreddits: &[String]) -> Vec<Discussion> {
        let mut all = Vec::new();

        for subreddit in subreddits {
            match self.scrape_subreddit(subreddit) {
                Ok(discussions) => {
                    all.extend(discussions);
                    info!(running_total = all.len(), "discussions collected");
                }
                Err(err) => warn!(subreddit = %subreddit, error = %err, "failed to scrape subreddit"),
            }
        }

        let unique = dedup_discussions(all);
        info!(unique = unique.len(), "scraping complete");
        unique
    }

    /// Hot listing of one subreddit, following `after` cursors until `limit` posts.
    pub fn scrape_hot(&self, subreddit: &str, limit: usize) -> Result<Vec<Discussion>> {
        info!(subreddit, limit, "scraping hot posts");
        let mut discussions = Vec::new();
        let mut after: Option<String> = None;

        while discussions.len() < limit {
            let remaining = limit - discussions.len();
            let (posts, next) = self.fetch_listing(&hot_url(subreddit, remaining, after.as_deref())?)?;
            if posts.is_empty() {
                break;
            }
            for post in posts.into_iter().take(remaining) {
                discussions.push(self.build_discussion(post, subreddit));
            }
            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        Ok(dedup_discussions(discussions))
    }
}

pub fn discussion_statistics(discussions: &[Discussion]) -> Option<DiscussionStats> {
    if discussions.is_empty() {
        return None;
    }

    let total_posts = discussions.len();
    let total_comments = discussions.iter().map(|d| d.top_comments.len()).sum();
    let avg_score = discussions.iter().map(|d| d.score as f64).sum::<f64>() / total_posts as f64;

    let mut subreddit_breakdown = BTreeMap::<String, usize>::new();
    let mut drink_counts = HashMap::<&str, usize>::new();
    for discussion in discussions {
        *subreddit_breakdown.entry(discussion.subreddit.clone()).or_default() += 1;
        for drink in &discussion.mentioned_drinks {
            *drink_counts.entry(drink.as_str()).or_default() += 1;
        }
    }

    let mut top_mentioned_drinks = drink_counts
        .into_iter()
        .map(|(drink, count)| (drink.to_string(), count))
        .collect::<Vec<_>>();
    top_mentioned_drinks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_mentioned_drinks.truncate(10);

    Some(DiscussionStats {
        total_posts,
        total_comments,
        avg_score,
        subreddit_breakdown,
        top_mentioned_drinks,
    })
}

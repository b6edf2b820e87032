use std::collections::HashMap;

use anyhow::{Result, bail};
use serde_json::json;

use super::dunkin::{self, DunkinMenu};
use super::http::Fetcher;
use super::menu::{MenuSite, scrape_menu};
use super::reddit::{
    RedditScraper, comments_url, discussion_statistics, hot_url, search_url, top_url, SEARCH_QUERIES,
};
use super::starbucks::{self, StarbucksMenu};
use crate::cli::Retailer;
use crate::model::{Discussion, Temperature};
use crate::nlp::Extractor;

#[derive(Default)]
struct FixtureFetcher {
    pages: HashMap<String, String>,
}

impl FixtureFetcher {
    fn with(mut self, url: String, body: impl Into<String>) -> Self {
        self.pages.insert(url, body.into());
        self
    }
}

impl Fetcher for FixtureFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        match self.pages.get(url) {
            Some(body) => Ok(body.clone()),
            None => bail!("no fixture for {url}"),
        }
    }
}

fn post(id: &str, title: &str, score: i64, num_comments: i64) -> serde_json::Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": title,
            "selftext": "",
            "author": "brewer",
            "score": score,
            "upvote_ratio": 0.9,
            "num_comments": num_comments,
            "created_utc": 1_700_000_000.0,
            "permalink": format!("/r/Coffee/comments/{id}/"),
            "link_flair_text": null,
        }
    })
}

fn listing(children: Vec<serde_json::Value>, after: Option<&str>) -> String {
    json!({ "kind": "Listing", "data": { "children": children, "after": after } }).to_string()
}

fn reddit_fixture() -> FixtureFetcher {
    let comments = json!([
        { "kind": "Listing", "data": { "children": [post("a", "Recommend a drink?", 10, 5)] } },
        { "kind": "Listing", "data": { "children": [
            { "kind": "t1", "data": { "body": "Try an oat latte", "score": 5, "created_utc": 1_700_000_100.0 } },
            { "kind": "t1", "data": { "body": "Downvoted take", "score": 1, "created_utc": 1_700_000_200.0 } },
            { "kind": "more", "data": { "count": 3 } },
        ] } },
    ]);

    FixtureFetcher::default()
        .with(
            search_url("Coffee", SEARCH_QUERIES[0]).expect("url"),
            listing(vec![post("a", "Recommend a drink?", 10, 5), post("b", "Low effort", 2, 9)], None),
        )
        .with(
            search_url("Coffee", SEARCH_QUERIES[1]).expect("url"),
            listing(vec![post("a", "Recommend a drink?", 10, 5)], None),
        )
        .with(search_url("Coffee", SEARCH_QUERIES[2]).expect("url"), listing(vec![], None))
        .with(
            top_url("Coffee").expect("url"),
            listing(
                vec![post("c", "Best cold brew order", 20, 1), post("d", "Morning photo", 50, 40)],
                None,
            ),
        )
        .with(comments_url("a").expect("url"), comments.to_string())
}

#[test]
fn scrape_subreddit_filters_and_deduplicates_posts() {
    let fetcher = reddit_fixture();
    let extractor = Extractor::new().expect("extractor");
    let scraper = RedditScraper::new(&fetcher, &extractor, "2026-10-19".to_string());

    let discussions = scraper.scrape_subreddit("Coffee").expect("scrape");
    let ids = discussions.iter().map(|d| d.post_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "c"]);

    let first = &discussions[0];
    assert_eq!(first.top_comments.len(), 1);
    assert_eq!(first.top_comments[0].body, "Try an oat latte");
    assert_eq!(first.top_comments[0].created_utc, "2023-11-14T22:15:00Z");
    assert_eq!(first.mentioned_drinks, vec!["latte".to_string()]);
    assert_eq!(first.url, "https://reddit.com/r/Coffee/comments/a/");
    assert_eq!(first.created_utc, "2023-11-14T22:13:20Z");
    assert_eq!(first.scraped_date, "2026-10-19");

    // Missing comment fixture degrades to no comments.
    assert!(discussions[1].top_comments.is_empty());
    assert_eq!(discussions[1].mentioned_drinks, vec!["cold brew".to_string()]);
}

#[test]
fn scrape_all_skips_failing_subreddits() {
    let fetcher = reddit_fixture();
    let extractor = Extractor::new().expect("extractor");
    let scraper = RedditScraper::new(&fetcher, &extractor, "2026-10-19".to_string());

    let discussions = scraper.scrape_all(&["Missing".to_string(), "Coffee".to_string()]);
    assert_eq!(discussions.len(), 2);
}

#[test]
fn scrape_hot_follows_after_cursor_until_limit() {
    let fetcher = FixtureFetcher::default()
        .with(
            hot_url("Coffee", 3, None).expect("url"),
            listing(vec![post("a", "One", 1, 0), post("b", "Two", 1, 0)], Some("t3_b")),
        )
        .with(
            hot_url("Coffee", 1, Some("t3_b")).expect("url"),
            listing(vec![post("c", "Three", 1, 0), post("d", "Four", 1, 0)], Some("t3_d")),
        );
    let extractor = Extractor::new().expect("extractor");
    let scraper = RedditScraper::new(&fetcher, &extractor, "2026-10-19".to_string());

    let discussions = scraper.scrape_hot("Coffee", 3).expect("hot");
    let ids = discussions.iter().map(|d| d.post_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

fn discussion(id: &str, subreddit: &str, score: i64, drinks: &[&str]) -> Discussion {
    Discussion {
        post_id: id.to_string(),
        title: String::new(),
        text: String::new(),
        author: "brewer".to_string(),
        score,
        upvote_ratio: 1.0,
        num_comments: 0,
        created_utc: String::new(),
        url: String::new(),
        subreddit: subreddit.to_string(),
        top_comments: Vec::new(),
        flair: None,
        scraped_date: "2026-10-19".to_string(),
        mentioned_drinks: drinks.iter().map(|d| d.to_string()).collect(),
    }
}

#[test]
fn discussion_statistics_counts_subreddits_and_drinks() {
    assert!(discussion_statistics(&[]).is_none());

    let stats = discussion_statistics(&[
        discussion("a", "Coffee", 10, &["latte", "mocha"]),
        discussion("b", "starbucks", 20, &["latte"]),
        discussion("c", "Coffee", 30, &[]),
    ])
    .expect("stats");

    assert_eq!(stats.total_posts, 3);
    assert_eq!(stats.avg_score, 20.0);
    assert_eq!(stats.subreddit_breakdown.get("Coffee"), Some(&2));
    assert_eq!(
        stats.top_mentioned_drinks,
        vec![("latte".to_string(), 2), ("mocha".to_string(), 1)]
    );
}

#[test]
fn starbucks_links_prefer_anchors_then_source_patterns() {
    let site = StarbucksMenu::new().expect("site");

    let anchors = r#"
        <a href="/menu/product/123/hot">Latte</a>
        <a href="https://www.starbucks.com/menu/product/456/iced?parent=x">Iced Latte</a>
        <a href="/menu/product/123/hot">Latte again</a>
        <a href="https://example.com/menu/product/9/hot">Elsewhere</a>
    "#;
    assert_eq!(
        site.collect_item_links(anchors),
        vec!["/menu/product/123/hot".to_string(), "/menu/product/456/iced".to_string()]
    );

    let inline = r#"<script>window.data = {"url":"/menu/product/789/hot"};</script>"#;
    assert_eq!(site.collect_item_links(inline), vec!["/menu/product/789/hot".to_string()]);

    let bootstrapped = r#"<script>{"productNumber": 2123, "name": "x", "formCode": "iced"}</script>"#;
    assert_eq!(
        site.collect_item_links(bootstrapped),
        vec!["/menu/product/2123/iced".to_string()]
    );
}

#[test]
fn starbucks_item_page_parses_attributes() {
    let site = StarbucksMenu::new().expect("site");
    let html = r#"
        <html><body>
        <h1>Iced Pumpkin Cream Chai</h1>
        <p>Chai tea with pumpkin cream.</p>
        <p>Available in Grande and Venti.</p>
        <span>240 calories</span>
        </body></html>
    "#;

    let item = site
        .parse_item(html, "https://www.starbucks.com/menu/product/1/iced", "Cold Drink", "2026-10-19")
        .expect("parse")
        .expect("item");

    assert_eq!(item.name, "Iced Pumpkin Cream Chai");
    assert_eq!(item.description, "Chai tea with pumpkin cream. Available in Grande and Venti.");
    assert_eq!(item.sizes, vec!["Grande".to_string(), "Venti".to_string()]);
    assert_eq!(item.nutrition.calories.as_deref(), Some("240"));
    assert_eq!(item.temperature, Temperature::Cold);
    assert!(item.has_caffeine);
    assert!(item.is_seasonal);
    assert!(item.customizations.contains_key("espresso_shots"));

    let nameless = site
        .parse_item("<p>nothing</p>", "u", "Hot Coffee", "2026-10-19")
        .expect("parse");
    assert!(nameless.is_none());
}

#[test]
fn starbucks_inference_rules() {
    assert_eq!(starbucks::infer_temperature("Frappuccino", "Caramel Frappuccino"), Temperature::Frozen);
    assert_eq!(starbucks::infer_temperature("Hot Coffee", "Iced Americano"), Temperature::Cold);
    assert_eq!(starbucks::infer_temperature("Hot Coffee", "Caffe Latte"), Temperature::Hot);

    assert!(!starbucks::infer_caffeine("Mint Majesty", "An herbal tea"));
    assert!(!starbucks::infer_caffeine("Decaf Pike Place", ""));
    assert!(starbucks::infer_caffeine("Earl Grey", "Black tea"));
    assert!(starbucks::infer_caffeine("Caffe Latte", ""));
}

#[test]
fn dunkin_categories_come_from_menu_page_with_fallback() {
    let site = DunkinMenu::new().expect("site");
    let menu_url = format!("{}/en/menu", Retailer::Dunkin.base_url());
    let fetcher = FixtureFetcher::default().with(
        menu_url,
        r#"
        <a href="/en/menu/coffee">Hot Coffee</a>
        <a href="/en/menu/iced-coffee"></a>
        <a href="/en/menu/coffee">Duplicate</a>
        <a href="/en/menu/coffee/latte">Latte</a>
        <a href="/en/about">About</a>
        "#,
    );

    let categories = site.categories(&fetcher).expect("categories");
    let names = categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Hot Coffee", "Iced Coffee"]);
    assert_eq!(categories[1].path, "/en/menu/iced-coffee");

    let fallback = site.categories(&FixtureFetcher::default()).expect("fallback");
    assert_eq!(fallback.len(), 6);
    assert_eq!(fallback[0].name, "Coffee");
}

#[test]
fn dunkin_item_links_and_detail_page() {
    let site = DunkinMenu::new().expect("site");

    let anchors = r#"<a href="/en/menu/coffee/latte">Latte</a><a href="/en/menu/coffee">Coffee</a>"#;
    assert_eq!(site.collect_item_links(anchors), vec!["/en/menu/coffee/latte".to_string()]);

    let inline = r#"<div data-target="/en/menu/cold-brew/sweet-cold-brew"></div>"#;
    assert_eq!(
        site.collect_item_links(inline),
        vec!["/en/menu/cold-brew/sweet-cold-brew".to_string()]
    );

    let html = r#"
        <html><head><meta name="description" content=" Smooth cold brew. "></head>
        <body><h2>Sweet Cold Brew</h2><p>Small Medium 90 Calories</p></body></html>
    "#;
    let item = site
        .parse_item(html, "u", "Cold Brew", "2026-10-19")
        .expect("parse")
        .expect("item");
    assert_eq!(item.name, "Sweet Cold Brew");
    assert_eq!(item.description, "Smooth cold brew.");
    assert_eq!(item.sizes, vec!["Small".to_string(), "Medium".to_string()]);
    assert_eq!(item.nutrition.calories.as_deref(), Some("90"));
    assert_eq!(item.temperature, Temperature::Cold);
    assert!(item.has_caffeine);
    assert!(!item.is_seasonal);

    assert_eq!(dunkin::infer_temperature("Frozen Drinks", "Vanilla Bean Coolatta"), Temperature::Frozen);
    assert!(!dunkin::infer_caffeine("Decaf Original Blend"));
}

#[test]
fn scrape_menu_counts_failures_per_page() {
    let site = StarbucksMenu::new().expect("site");
    let base = Retailer::Starbucks.base_url();
    let fetcher = FixtureFetcher::default()
        .with(
            format!("{base}/menu/drinks/hot-coffee"),
            r#"<a href="/menu/product/1/hot">A</a><a href="/menu/product/2/hot">B</a><a href="/menu/product/3/hot">C</a>"#,
        )
        .with(format!("{base}/menu/product/1/hot"), "<h1>Caffe Latte</h1><p>Espresso and milk.</p>");

    let scrape = scrape_menu(&fetcher, &site, Some(2), "2026-10-19").expect("scrape");

    assert_eq!(scrape.items.len(), 1);
    assert_eq!(scrape.items[0].category, "Hot Coffee");
    assert_eq!(scrape.items[0].url, format!("{base}/menu/product/1/hot"));
    // One missing item page plus six missing category pages.
    assert_eq!(scrape.failed, 7);
    assert_eq!(scrape.category_counts.len(), 1);
    assert_eq!(scrape.category_counts.get("Hot Coffee"), Some(&1));
}

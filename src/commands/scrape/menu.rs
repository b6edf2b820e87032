use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::cli::Retailer;
use crate::model::{MenuItem, Nutrition};

use super::http::Fetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuCategory {
    pub name: String,
    pub path: String,
}

impl MenuCategory {
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
        }
    }
}

/// One retailer's page layout: where categories and items live and how to read an item page.
pub trait MenuSite {
    fn retailer(&self) -> Retailer;

    fn categories(&self, fetcher: &dyn Fetcher) -> Result<Vec<MenuCategory>>;

    /// Site-relative item paths found on a category page, sorted and deduplicated.
    fn collect_item_links(&self, html: &str) -> Vec<String>;

    /// `Ok(None)` when the page has no recognizable item name.
    fn parse_item(&self, html: &str, url: &str, category: &str, scraped_date: &str) -> Result<Option<MenuItem>>;
}

#[derive(Debug, Default)]
pub struct MenuScrape {
    pub items: Vec<MenuItem>,
    pub failed: usize,
    pub category_counts: BTreeMap<String, usize>,
}

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css}: {err:?}"))
}

/// Trimmed text of the first element matching `selector`, if non-empty.
pub fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

pub fn page_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `href` resolved against `base_url`, reduced to its path when it stays on the same host.
pub fn site_path(base_url: &Url, href: &str) -> Option<String> {
    let resolved = base_url.join(href.trim()).ok()?;
    if resolved.host_str() != base_url.host_str() {
        return None;
    }
    Some(resolved.path().to_string())
}

/// Sizes from `vocabulary` mentioned anywhere in the page, else `defaults`.
pub fn sizes_in(text: &str, vocabulary: &[&str], defaults: &[&str]) -> Vec<String> {
    let lower = text.to_lowercase();
    let found = vocabulary
        .iter()
        .filter(|size| lower.contains(&size.to_lowercase()))
        .map(|size| size.to_string())
        .collect::<Vec<_>>();

    if found.is_empty() {
        defaults.iter().map(|size| size.to_string()).collect()
    } else {
        found
    }
}

pub fn nutrition_in(text: &str, calories_pattern: &Regex) -> Nutrition {
    Nutrition {
        calories: calories_pattern
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

pub fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

pub fn customization_map(groups: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    groups
        .iter()
        .map(|(group, options)| {
            (
                group.to_string(),
                options.iter().map(|option| option.to_string()).collect(),
            )
        })
        .collect()
}

pub fn regex_paths(pattern: &Regex, haystack: &str) -> BTreeSet<String> {
    pattern
        .find_iter(haystack)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Walks every category, fetching item pages. Failing pages are logged and skipped.
pub fn scrape_menu(
    fetcher: &dyn Fetcher,
    site: &dyn MenuSite,
    max_items_per_category: Option<usize>,
    scraped_date: &str,
) -> Result<MenuScrape> {
    let retailer = site.retailer();
    let categories = site.categories(fetcher)?;
    info!(retailer = retailer.slug(), categories = categories.len(), "scraping menu");

    let mut scrape = MenuScrape::default();

    for category in &categories {
        let category_url = format!("{}{}", retailer.base_url(), category.path);
        let html = match fetcher.fetch_text(&category_url) {
            Ok(html) => html,
            Err(err) => {
                warn!(category = %category.name, error = %err, "failed to fetch category page");
                scrape.failed += 1;
                continue;
            }
        };

        let mut links = site.collect_item_links(&html);
        if let Some(max) = max_items_per_category {
            links.truncate(max);
        }
        info!(category = %category.name, items = links.len(), "found menu items");

        let mut collected = 0;
        for link in &links {
            let item_url = if link.starts_with("http") {
                link.clone()
            } else {
                format!("{}{}", retailer.base_url(), link)
            };

            let parsed = fetcher
                .fetch_text(&item_url)
                .and_then(|page| site.parse_item(&page, &item_url, &category.name, scraped_date));

            match parsed {
                Ok(Some(item)) => {
                    scrape.items.push(item);
                    collected += 1;
                }
                Ok(None) => {
                    warn!(url = %item_url, "item page had no name");
                    scrape.failed += 1;
                }
                Err(err) => {
                    warn!(url = %item_url, error = %err, "failed to scrape menu item");
                    scrape.failed += 1;
                }
            }
        }

        scrape.category_counts.insert(category.name.clone(), collected);
        info!(category = %category.name, collected, total = scrape.items.len(), "category done");
    }

    Ok(scrape)
}

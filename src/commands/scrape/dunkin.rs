use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use crate::cli::Retailer;
use crate::model::{MenuItem, Temperature};
use crate::util::title_case;

use super::http::Fetcher;
use super::menu::{
    MenuCategory, MenuSite, contains_any, customization_map, first_text, nutrition_in, page_text,
    parse_selector, regex_paths, site_path, sizes_in,
};

const MENU_PATH: &str = "/en/menu";
const FALLBACK_CATEGORIES: &[(&str, &str)] = &[
    ("Coffee", "/en/menu/coffee"),
    ("Espresso", "/en/menu/espresso"),
    ("Iced Coffee", "/en/menu/iced-coffee"),
    ("Cold Brew", "/en/menu/cold-brew"),
    ("Tea", "/en/menu/tea"),
    ("Frozen Drinks", "/en/menu/frozen-drinks"),
];
const CATEGORY_SEGMENTS: usize = 3;
const MIN_ITEM_SEGMENTS: usize = 4;

const SIZES: &[&str] = &["Small", "Medium", "Large"];
const SEASONAL_KEYWORDS: &[&str] = &[
    "pumpkin",
    "peppermint",
    "gingerbread",
    "eggnog",
    "holiday",
    "christmas",
    "fall",
    "winter",
    "summer",
];
const CUSTOMIZATIONS: &[(&str, &[&str])] = &[
    ("milk_options", &["Whole Milk", "Skim Milk", "Oat Milk", "Almond Milk", "Cream"]),
    (
        "flavors",
        &["French Vanilla", "Hazelnut", "Caramel", "Mocha", "Blueberry", "Coconut", "Toasted Almond"],
    ),
    ("sweeteners", &["Sugar", "Splenda", "Equal", "Liquid Cane Sugar"]),
];

pub struct DunkinMenu {
    base_url: Url,
    anchor: Selector,
    heading: Selector,
    subheading: Selector,
    meta_description: Selector,
    item_path: Regex,
    calories: Regex,
}

impl DunkinMenu {
    pub fn new() -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(Retailer::Dunkin.base_url()).context("invalid Dunkin base url")?,
            anchor: parse_selector("a[href]")?,
            heading: parse_selector("h1")?,
            subheading: parse_selector("h2")?,
            meta_description: parse_selector(r#"meta[name="description"]"#)?,
            item_path: Regex::new(r"(?i)/en/menu/[a-z0-9\-]+/[a-z0-9\-]+")
                .context("failed to compile item path pattern")?,
            calories: Regex::new(r"(?i)(\d+)\s*calorie").context("failed to compile calorie pattern")?,
        })
    }

    /// Same-site `/en/menu` anchors as (path, anchor text), in page order.
    fn menu_links(&self, document: &Html) -> Vec<(String, String)> {
        document
            .select(&self.anchor)
            .filter_map(|anchor| {
                let path = site_path(&self.base_url, anchor.value().attr("href")?)?;
                let text = anchor.text().collect::<String>().trim().to_string();
                path.starts_with(MENU_PATH).then_some((path, text))
            })
            .collect()
    }

    /// Category links on the menu landing page, in page order.
    pub fn parse_categories(&self, html: &str) -> Vec<MenuCategory> {
        let document = Html::parse_document(html);
        let mut seen = BTreeSet::new();
        let mut categories = Vec::new();

        for (path, text) in self.menu_links(&document) {
            let segments = path_segments(&path);
            if segments.len() != CATEGORY_SEGMENTS || !seen.insert(path.clone()) {
                continue;
            }

            let name = if text.is_empty() {
                title_case(&segments[CATEGORY_SEGMENTS - 1].replace('-', " "))
            } else {
                text
            };
            categories.push(MenuCategory { name, path });
        }

        categories
    }
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

pub fn infer_temperature(category: &str, name: &str) -> Temperature {
    let text = format!("{category} {name}").to_lowercase();

    if contains_any(&text, &["iced", "cold"]) {
        Temperature::Cold
    } else if contains_any(&text, &["frozen", "coolatta"]) {
        Temperature::Frozen
    } else {
        Temperature::Hot
    }
}

pub fn infer_caffeine(name: &str) -> bool {
    !name.to_lowercase().contains("decaf")
}

pub fn is_seasonal(name: &str) -> bool {
    contains_any(&name.to_lowercase(), SEASONAL_KEYWORDS)
}

impl MenuSite for DunkinMenu {
    fn retailer(&self) -> Retailer {
        Retailer::Dunkin
    }

    fn categories(&self, fetcher: &dyn Fetcher) -> Result<Vec<MenuCategory>> {
        let menu_url = format!("{}{MENU_PATH}", Retailer::Dunkin.base_url());
        let categories = match fetcher.fetch_text(&menu_url) {
            Ok(html) => self.parse_categories(&html),
            Err(err) => {
                warn!(error = %err, "failed to fetch menu landing page");
                Vec::new()
            }
        };

        if categories.is_empty() {
            warn!("no menu categories discovered; using fallback list");
            return Ok(FALLBACK_CATEGORIES
                .iter()
                .map(|(name, path)| MenuCategory::new(name, path))
                .collect());
        }

        Ok(categories)
    }

    fn collect_item_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links = self
            .menu_links(&document)
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| path_segments(path).len() >= MIN_ITEM_SEGMENTS)
            .collect::<BTreeSet<_>>();

        if links.is_empty() {
            links = regex_paths(&self.item_path, html);
        }

        links.into_iter().collect()
    }

    fn parse_item(&self, html: &str, url: &str, category: &str, scraped_date: &str) -> Result<Option<MenuItem>> {
        let document = Html::parse_document(html);
        let Some(name) = first_text(&document, &self.heading).or_else(|| first_text(&document, &self.subheading))
        else {
            return Ok(None);
        };

        let description = document
            .select(&self.meta_description)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .map(|content| content.trim().to_string())
            .unwrap_or_default();
        let text = page_text(&document);

        Ok(Some(MenuItem {
            temperature: infer_temperature(category, &name),
            has_caffeine: infer_caffeine(&name),
            is_seasonal: is_seasonal(&name),
            sizes: sizes_in(&text, SIZES, SIZES),
            nutrition: nutrition_in(&text, &self.calories),
            customizations: customization_map(CUSTOMIZATIONS),
            category: category.to_string(),
            url: url.to_string(),
            scraped_date: scraped_date.to_string(),
            name,
            description,
        }))
    }
}

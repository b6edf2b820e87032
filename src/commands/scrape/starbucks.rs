use std::collections::BTreeSet;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::cli::Retailer;
use crate::model::{MenuItem, Temperature};

use super::http::Fetcher;
use super::menu::{
    MenuCategory, MenuSite, contains_any, customization_map, first_text, nutrition_in, page_text,
    parse_selector, regex_paths, site_path, sizes_in,
};

const CATEGORIES: &[(&str, &str)] = &[
    ("Hot Coffee", "/menu/drinks/hot-coffee"),
    ("Hot Tea", "/menu/drinks/hot-tea"),
    ("Hot Drink", "/menu/drinks/hot-drink"),
    ("Frappuccino", "/menu/drinks/frappuccino-blended-beverage"),
    ("Cold Coffee", "/menu/drinks/cold-coffee"),
    ("Iced Tea", "/menu/drinks/iced-tea"),
    ("Cold Drink", "/menu/drinks/cold-drink"),
];

const SIZES: &[&str] = &["Short", "Tall", "Grande", "Venti", "Trenta"];
const DEFAULT_SIZES: &[&str] = &["Tall", "Grande", "Venti"];
const DESCRIPTION_PARAGRAPHS: usize = 3;
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
    (
        "milk_options",
        &["Whole Milk", "2% Milk", "Nonfat Milk", "Oat Milk", "Almond Milk", "Coconut Milk", "Soy Milk"],
    ),
    ("espresso_shots", &["1", "2", "3", "4"]),
    ("syrups", &["Vanilla", "Caramel", "Hazelnut", "Mocha", "Sugar Free Vanilla"]),
    ("toppings", &["Whipped Cream", "Caramel Drizzle", "Chocolate Drizzle"]),
];

pub struct StarbucksMenu {
    base_url: Url,
    anchor: Selector,
    heading: Selector,
    paragraph: Selector,
    product_path: Regex,
    bootstrapped_product: Regex,
    calories: Regex,
}

impl StarbucksMenu {
    pub fn new() -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(Retailer::Starbucks.base_url()).context("invalid Starbucks base url")?,
            anchor: parse_selector("a[href]")?,
            heading: parse_selector("h1")?,
            paragraph: parse_selector("p")?,
            product_path: Regex::new(r"/menu/product/[A-Za-z0-9\-]+(?:/[A-Za-z0-9\-]+)?")
                .context("failed to compile product path pattern")?,
            bootstrapped_product: Regex::new(
                r#"(?s)"productNumber"\s*:\s*"?([A-Za-z0-9\-]+)"?.*?"formCode"\s*:\s*"([A-Za-z0-9\-]+)""#,
            )
            .context("failed to compile bootstrapped product pattern")?,
            calories: Regex::new(r"(?i)(\d+)\s*calorie").context("failed to compile calorie pattern")?,
        })
    }
}

pub fn infer_temperature(category: &str, name: &str) -> Temperature {
    let name = name.to_lowercase();
    let category = category.to_lowercase();

    if name.contains("iced") || category.contains("cold") {
        Temperature::Cold
    } else if category.contains("frappuccino") || name.contains("frappuccino") {
        Temperature::Frozen
    } else {
        Temperature::Hot
    }
}

pub fn infer_caffeine(name: &str, description: &str) -> bool {
    let text = format!("{name} {description}").to_lowercase();

    if text.contains("decaf") {
        return false;
    }
    if contains_any(&text, &["tea", "herbal", "rooibos"]) {
        return !contains_any(&text, &["herbal", "rooibos"]);
    }
    true
}

pub fn is_seasonal(name: &str) -> bool {
    contains_any(&name.to_lowercase(), SEASONAL_KEYWORDS)
}

impl MenuSite for StarbucksMenu {
    fn retailer(&self) -> Retailer {
        Retailer::Starbucks
    }

    fn categories(&self, _fetcher: &dyn Fetcher) -> Result<Vec<MenuCategory>> {
        Ok(CATEGORIES
            .iter()
            .map(|(name, path)| MenuCategory::new(name, path))
            .collect())
    }

    /// Anchors first, then product paths anywhere in the source, then
    /// `productNumber`/`formCode` pairs from embedded page state.
    fn collect_item_links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let mut links = document
            .select(&self.anchor)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| href.contains("/menu/product/"))
            .filter_map(|href| site_path(&self.base_url, href))
            .collect::<BTreeSet<_>>();

        if links.is_empty() {
            links = regex_paths(&self.product_path, html);
        }

        if links.is_empty() {
            links = self
                .bootstrapped_product
                .captures_iter(html)
                .map(|captures| format!("/menu/product/{}/{}", &captures[1], &captures[2]))
                .collect();
        }

        links.into_iter().collect()
    }

    fn parse_item(&self, html: &str, url: &str, category: &str, scraped_date: &str) -> Result<Option<MenuItem>> {
        let document = Html::parse_document(html);
        let Some(name) = first_text(&document, &self.heading) else {
            return Ok(None);
        };

        let description = document
            .select(&self.paragraph)
            .take(DESCRIPTION_PARAGRAPHS)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let text = page_text(&document);

        Ok(Some(MenuItem {
            temperature: infer_temperature(category, &name),
            has_caffeine: infer_caffeine(&name, &description),
            is_seasonal: is_seasonal(&name),
            sizes: sizes_in(&text, SIZES, DEFAULT_SIZES),
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

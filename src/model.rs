use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscussionComment {
    pub body: String,
    pub score: i64,
    pub created_utc: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Discussion {
    pub post_id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub author: String,
    pub score: i64,
    #[serde(default)]
    pub upvote_ratio: f64,
    pub num_comments: i64,
    pub created_utc: String,
    pub url: String,
    pub subreddit: String,
    #[serde(default)]
    pub top_comments: Vec<DiscussionComment>,
    #[serde(default)]
    pub flair: Option<String>,
    pub scraped_date: String,
    #[serde(default)]
    pub mentioned_drinks: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    Hot,
    Cold,
    Frozen,
}

impl Temperature {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Cold => "cold",
            Self::Frozen => "frozen",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Nutrition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    pub scraped_date: String,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub nutrition: Nutrition,
    #[serde(default)]
    pub customizations: BTreeMap<String, Vec<String>>,
    pub temperature: Temperature,
    pub has_caffeine: bool,
    pub is_seasonal: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Roaster,
    Cafe,
    Brand,
    Retailer,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Roaster => "roaster",
            Self::Cafe => "cafe",
            Self::Brand => "brand",
            Self::Retailer => "retailer",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "roaster" => Ok(Self::Roaster),
            "cafe" => Ok(Self::Cafe),
            "brand" => Ok(Self::Brand),
            "retailer" => Ok(Self::Retailer),
            other => bail!("unknown entity type: {other}"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Prominent,
    #[default]
    Moderate,
    Subtle,
}

impl Intensity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prominent => "prominent",
            Self::Moderate => "moderate",
            Self::Subtle => "subtle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFlavor {
    pub term: String,
    #[serde(default)]
    pub intensity: Intensity,
    #[serde(default = "default_flavor_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub sentiment: f64,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_flavor_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRoaster {
    pub name: String,
    #[serde(default)]
    pub context: String,
}

/// Structured output of the extraction stage, persisted column by column in `nlp_extractions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Extraction {
    #[serde(default)]
    pub flavors: Vec<ExtractedFlavor>,
    #[serde(default)]
    pub roasters: Vec<ExtractedRoaster>,
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub brew_methods: Vec<String>,
    #[serde(default)]
    pub process_methods: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRunManifest<C: Serialize> {
    pub manifest_version: u32,
    pub run_id: String,
    pub stage: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub db_path: String,
    pub counts: C,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub source: String,
    pub filename: String,
    pub sha256: String,
    pub record_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub source: String,
    pub started_at: String,
    pub updated_at: String,
    pub output_path: String,
    pub snapshot: SnapshotEntry,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub snapshot_count: usize,
    pub snapshots: Vec<SnapshotEntry>,
}

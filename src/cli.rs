use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "brewlink",
    version,
    about = "Coffee discussion and menu scraping, extraction, and entity linking"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or upgrade the database schema and seed reference flavors.
    Schema(SchemaArgs),
    /// Scrape coffee discussions from Reddit into a JSON snapshot.
    ScrapeReddit(ScrapeRedditArgs),
    /// Scrape a retailer drink menu into a JSON snapshot.
    ScrapeMenu(ScrapeMenuArgs),
    /// Load a discussion snapshot into raw_posts.
    ImportDiscussions(ImportDiscussionsArgs),
    /// Load a menu snapshot into entities and coffee_products.
    ImportMenu(ImportMenuArgs),
    /// Copy legacy raw_reviews rows into raw_posts.
    Migrate(StoreArgs),
    /// Run keyword extraction over unprocessed raw posts.
    Process(ProcessArgs),
    /// Link extracted mentions to flavors, roasters, origins, and products.
    Link(LinkArgs),
    /// Recompute popularity metrics and flavor rankings.
    Aggregate(AggregateArgs),
    /// Run schema, import, process, link, and aggregate in order.
    Pipeline(PipelineArgs),
    /// Print a database diagnostic report.
    Check(StoreArgs),
    /// Print a data-quality report for a discussion snapshot.
    Analyze(AnalyzeArgs),
    /// Summarize scraped snapshots and pipeline readiness.
    Inventory(InventoryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, env = "BREWLINK_DATA_ROOT", default_value = "data")]
    pub data_root: PathBuf,

    #[arg(long, env = "BREWLINK_DB_PATH")]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_root.join("brewlink.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.data_root.join("manifests")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_root.join("raw")
    }
}

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Extra SQL file executed after the built-in schema.
    #[arg(long)]
    pub sql_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RedditMode {
    /// Search recommendation queries and top posts across all target subreddits.
    Search,
    /// Hot listing of a single subreddit.
    Hot,
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeRedditArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_enum, default_value_t = RedditMode::Search)]
    pub mode: RedditMode,

    /// Subreddits to scrape; defaults to the built-in coffee list (search) or Coffee (hot).
    #[arg(long = "subreddit")]
    pub subreddits: Vec<String>,

    /// Post limit for hot mode.
    #[arg(long, default_value_t = 200)]
    pub limit: usize,

    #[arg(long, env = "REDDIT_USER_AGENT", default_value = "brewlink/0.1 (coffee research)")]
    pub user_agent: String,

    #[arg(long, env = "REDDIT_REQUEST_DELAY_MS", default_value_t = 1000)]
    pub delay_ms: u64,

    /// Also write scraped posts into raw_posts.
    #[arg(long, default_value_t = false)]
    pub store_db: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Retailer {
    Starbucks,
    Dunkin,
}

impl Retailer {
    pub fn slug(self) -> &'static str {
        match self {
            Self::Starbucks => "starbucks",
            Self::Dunkin => "dunkin",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Starbucks => "Starbucks",
            Self::Dunkin => "Dunkin",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Self::Starbucks => "https://www.starbucks.com",
            Self::Dunkin => "https://www.dunkindonuts.com",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeMenuArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_enum)]
    pub retailer: Retailer,

    #[arg(long)]
    pub max_items_per_category: Option<usize>,

    #[arg(
        long,
        env = "MENU_USER_AGENT",
        default_value = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36"
    )]
    pub user_agent: String,

    #[arg(long, env = "MENU_REQUEST_DELAY_MS", default_value_t = 1000)]
    pub delay_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ImportDiscussionsArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ImportMenuArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, value_enum)]
    pub retailer: Retailer,
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,
}

#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 500)]
    pub total_limit: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RankingPeriod {
    Week,
    Month,
    Year,
}

impl RankingPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    pub fn days(self) -> i64 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 365,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long = "period", value_enum)]
    pub periods: Vec<RankingPeriod>,
}

#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub sql_file: Option<PathBuf>,

    /// Discussion snapshot imported before processing.
    #[arg(long)]
    pub discussions: Option<PathBuf>,

    #[arg(long, default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 500)]
    pub link_limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, env = "BREWLINK_DATA_ROOT", default_value = "data")]
    pub data_root: PathBuf,

    /// Snapshot to analyze; defaults to the newest Reddit snapshot.
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, env = "BREWLINK_DATA_ROOT", default_value = "data")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

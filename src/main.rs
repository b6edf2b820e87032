mod cli;
mod commands;
mod db;
mod model;
mod nlp;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            error!(error = %err, "failed to load .env file");
            std::process::exit(1);
        }
        debug!(".env file not found; using process environment only");
    }

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Schema(args) => commands::schema::run(args),
        Commands::ScrapeReddit(args) => commands::scrape::run_reddit(args),
        Commands::ScrapeMenu(args) => commands::scrape::run_menu(args),
        Commands::ImportDiscussions(args) => commands::import::run_discussions(args),
        Commands::ImportMenu(args) => commands::import::run_menu(args),
        Commands::Migrate(args) => commands::migrate::run(args),
        Commands::Process(args) => commands::process::run(args),
        Commands::Link(args) => commands::link::run(args),
        Commands::Aggregate(args) => commands::aggregate::run(args),
        Commands::Pipeline(args) => commands::pipeline::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Inventory(args) => commands::inventory::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

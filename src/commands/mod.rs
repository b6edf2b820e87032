pub mod aggregate;
pub mod analyze;
pub mod check;
pub mod import;
pub mod inventory;
pub mod link;
pub mod migrate;
pub mod pipeline;
pub mod process;
pub mod schema;
pub mod scrape;

mod manifest;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::{error, info};

use crate::cli::SchemaArgs;
use crate::db::{DB_SCHEMA_VERSION, missing_required_tables, open_database};

pub fn run(args: SchemaArgs) -> Result<()> {
    let db_path = args.store.resolved_db_path();
    info!(db_path = %db_path.display(), "initializing schema");

    let connection = open_database(&db_path)?;

    if let Some(sql_file) = &args.sql_file {
        run_sql_file(&connection, sql_file)?;
    }

    verify_required_tables(&connection)?;
    info!(db_schema_version = DB_SCHEMA_VERSION, "schema ready");
    Ok(())
}

pub fn run_sql_file(connection: &Connection, sql_file: &Path) -> Result<()> {
    info!(path = %sql_file.display(), "executing SQL file");

    let sql = fs::read_to_string(sql_file)
        .with_context(|| format!("failed to read {}", sql_file.display()))?;
    connection
        .execute_batch(&sql)
        .with_context(|| format!("failed to execute {}", sql_file.display()))?;

    info!(path = %sql_file.display(), "executed SQL file");
    Ok(())
}

pub fn verify_required_tables(connection: &Connection) -> Result<()> {
    let missing = missing_required_tables(connection)?;
    if !missing.is_empty() {
        error!(missing = ?missing, "required tables missing");
        bail!("schema setup incomplete; missing tables: {}", missing.join(", "));
    }

    info!(
        count = crate::db::REQUIRED_TABLES.len(),
        "all required tables exist"
    );
    Ok(())
}

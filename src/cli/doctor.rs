//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use sparkmind::config::SparkConfig;
use sparkmind::db;

pub fn doctor(config: &SparkConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `sparkmind serve` to initialize.");
        return Ok(());
    }

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;
    let stamp = db::migrations::get_embedding_stamp(&conn)?;

    println!("Sparkmind Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    match &stamp {
        Some(s) => println!("  Stored:          {} ({} dims)", s.model, s.dimensions),
        None => println!("  Stored:          (not set)"),
    }
    println!(
        "  Configured:      {} ({} dims)",
        config.embedding.model, config.embedding.dimensions
    );
    if let Some(s) = &stamp {
        if s.model != config.embedding.model || s.dimensions != config.embedding.dimensions {
            println!("  WARNING: model mismatch! Stored vectors will not match new queries.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Content items:   {}", report.content_count);
    println!("  Vectors:         {}", report.vector_count);
    println!("  Behavior events: {}", report.event_count);
    println!("  Sessions:        {}", report.session_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED");
    }

    Ok(())
}

//! CLI maintenance commands: `backfill` for unindexed content and `prune` for old events.

use anyhow::Result;

use sparkmind::config::SparkConfig;
use sparkmind::services::Services;

/// Index content that has no vector yet, or whose vector predates an edit.
pub async fn backfill(config: SparkConfig, limit: usize) -> Result<()> {
    let services = Services::from_config(config)?;
    println!("Scanning for unindexed content (limit {limit})...");
    let report = services.indexer.backfill(limit).await?;

    if report.scanned == 0 {
        println!("  Everything is indexed.");
    } else {
        println!(
            "  Scanned {}, indexed {}, deferred {}.",
            report.scanned, report.indexed, report.deferred
        );
        if report.deferred > 0 {
            println!("  Deferred items will be picked up by the next backfill.");
        }
    }
    if report.purged > 0 {
        println!("  Removed {} vector(s) of deleted content.", report.purged);
    }
    Ok(())
}

/// Drop behavior events older than the retention window.
pub async fn prune(config: SparkConfig, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(config.profile.behavior_retention_days);
    let db_path = config.resolved_db_path();
    let conn = sparkmind::db::open_database(&db_path)?;
    let tracker = sparkmind::memory::behavior::BehaviorTracker::new(sparkmind::db::shared(conn));

    let removed = tracker.prune(days).await?;
    println!("Removed {removed} behavior event(s) older than {days} days.");
    Ok(())
}

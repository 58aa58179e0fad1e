//! Cleanup command.

use satchel_store::RecordStore;
use tracing::info;

/// Purge records older than `days` from every collection.
pub fn run(store: &RecordStore, days: u32) -> Result<(), Box<dyn std::error::Error>> {
    info!("Running cleanup with a {days}-day threshold");

    let report = store.cleanup(days)?;

    println!("✓ Cleanup completed");
    println!("  Collections: {}", report.collections);
    println!("  Retained: {}", report.retained);
    println!("  Purged: {}", report.purged);

    Ok(())
}

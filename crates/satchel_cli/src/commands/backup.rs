//! Backup and restore commands.

use satchel_store::RecordStore;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Create an encrypted backup of the store.
pub fn create(store: &RecordStore, output_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Creating backup to {:?}", output_path);

    let blob = store.create_backup()?;

    let mut file = fs::File::create(output_path)?;
    file.write_all(&blob)?;
    file.sync_all()?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", output_path);
    println!("  Size: {} bytes", blob.len());
    println!("  Collections: {}", store.collections().len());

    Ok(())
}

/// Restore the store from a backup file.
///
/// The blob is fully validated before any collection is touched, so a
/// bad file leaves the store as it was.
pub fn restore(store: &RecordStore, input_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring from {:?}", input_path);

    let mut file = fs::File::open(input_path)?;
    let mut blob = Vec::new();
    file.read_to_end(&mut blob)?;

    let report = store.restore_backup(&blob)?;

    println!("✓ Store restored successfully");
    println!("  Collections: {}", report.collections);
    println!("  Records: {}", report.records);

    Ok(())
}

//! Inspect and stats commands.

use satchel_store::RecordStore;
use serde_json::Value;

/// List collections with record counts, or the records of one collection.
pub fn run(
    store: &RecordStore,
    collection: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    match collection {
        Some(name) => {
            let records = store.get_all(name)?;
            println!("Collection: {name} ({} records)", records.len());
            for record in records {
                let id = record
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("<no id>");
                println!("  {id}");
            }
        }
        None => {
            let names = store.collections();
            if names.is_empty() {
                println!("No collections");
                return Ok(());
            }
            println!("Collections");
            println!("===========");
            for name in names {
                let count = store.get_all(&name)?.len();
                println!("  {name}: {count} records");
            }
        }
    }

    Ok(())
}

/// Display storage statistics.
pub fn stats(store: &RecordStore) -> Result<(), Box<dyn std::error::Error>> {
    let stats = store.stats()?;

    println!("Storage Statistics");
    println!("==================");
    println!("  Records: {}", stats.item_count);
    println!("  Used: {} bytes", stats.used_bytes);
    println!("  Quota: {} bytes", stats.total_bytes);
    match stats.last_cleanup {
        Some(at) => println!("  Last cleanup: {at} ms since epoch"),
        None => println!("  Last cleanup: never"),
    }

    Ok(())
}

//! Status command handler

use std::sync::Arc;

use anyhow::Result;

use tabkeep_core::{Engine, MigrationRunner, SqliteStorage, StorageMedium};

use crate::output::{Output, OutputFormat};

/// Show status information
pub async fn show(engine: &Engine, storage: &Arc<SqliteStorage>, output: &Output) -> Result<()> {
    let config = engine.config();
    let medium: Arc<dyn StorageMedium> = storage.clone();
    let marker = MigrationRunner::with_defaults(medium, engine.instance_id().clone())
        .marker()
        .await?;
    let keys = storage.key_count().unwrap_or(0);

    let tabs = engine.tabs().tabs.len();
    let bookmarks = engine.bookmarks().bookmarks.len();
    let tags = engine.tags().tags.len();
    let closed = engine.recently_closed().items.len();
    let curating = engine.curate().active_session().is_some();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "database": config.sqlite_path(),
                    "keys": keys,
                    "migration": marker,
                    "counts": {
                        "tabs": tabs,
                        "bookmarks": bookmarks,
                        "tags": tags,
                        "recently_closed": closed
                    },
                    "curating": curating
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", bookmarks);
        }
        OutputFormat::Human => {
            println!("tabkeep Status");
            println!("==============");
            println!();
            println!("Storage:");
            println!("  Database: {}", config.sqlite_path().display());
            println!("  Keys:     {}", keys);
            println!();
            println!("Migration:");
            match marker {
                Some(marker) => println!(
                    "  Completed {} ({} migrated, {} skipped, {} failed)",
                    marker.completed_at.format("%Y-%m-%d %H:%M"),
                    marker.migrated,
                    marker.skipped,
                    marker.failed
                ),
                None => println!("  Not run"),
            }
            println!();
            println!("Contents:");
            println!("  Tabs:            {}", tabs);
            println!("  Bookmarks:       {}", bookmarks);
            println!("  Tags:            {}", tags);
            println!("  Recently closed: {}", closed);
            if curating {
                println!();
                println!("A curation session is in progress.");
            }
        }
    }

    Ok(())
}

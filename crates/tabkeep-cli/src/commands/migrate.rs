//! Migrate command handler

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tabkeep_core::{InstanceId, MigrationRunner, SqliteStorage};

use crate::output::{Output, OutputFormat};

/// Run the legacy migration, optionally removing legacy keys afterwards
pub async fn run(storage: Arc<SqliteStorage>, cleanup: bool, output: &Output) -> Result<()> {
    let runner = MigrationRunner::with_defaults(storage, InstanceId::generate());
    let migrated = runner.run().await?;
    let cleaned = if cleanup { runner.cleanup().await? } else { false };
    let marker = runner.marker().await?;
    info!(migrated, cleaned, "migration command finished");

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "migrated": migrated,
                    "cleaned_up": cleaned,
                    "marker": marker
                })
            );
        }
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            if migrated {
                output.success("Migrated legacy data");
            } else {
                println!("Nothing to migrate.");
            }
            if let Some(marker) = marker {
                println!(
                    "Marker: {} ({} migrated, {} skipped, {} failed)",
                    marker.completed_at.format("%Y-%m-%d %H:%M"),
                    marker.migrated,
                    marker.skipped,
                    marker.failed
                );
            }
            if cleaned {
                output.success("Removed legacy keys");
            }
        }
    }

    Ok(())
}

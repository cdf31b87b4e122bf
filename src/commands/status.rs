use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::model::ArtifactManifest;
use crate::package::MANIFEST_FILE;
use crate::store::Store;

const STATUS_META_KEYS: [&str; 4] = ["lastSyncIso", "apiStand", "schemaVersion", "dataSource"];
const STATUS_TABLES: [&str; 3] = ["bvl_mittel", "bvl_awg", "bvl_mittel_enrichments"];

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_path = args.output_dir.join(MANIFEST_FILE);
    let db_path = args.output_dir.join(&args.db_name);

    info!(output_dir = %args.output_dir.display(), "status requested");

    if manifest_path.exists() {
        let manifest = load_manifest(&manifest_path)?;
        info!(
            version = %manifest.version,
            api_version = %manifest.api_version,
            generated_at = %manifest.generated_at,
            files = manifest.files.len(),
            tables = manifest.tables.len(),
            build_start = %manifest.build.start_time,
            build_seconds = manifest.build.duration_seconds,
            runner = %manifest.build.runner,
            tool_version = %manifest.build.tool_version,
            "loaded manifest"
        );
        for file in &manifest.files {
            info!(
                name = %file.name,
                encoding = file.encoding.as_str(),
                size = file.size,
                sha256 = %file.sha256,
                "artifact"
            );
        }
    } else {
        warn!(path = %manifest_path.display(), "manifest missing");
    }

    if db_path.exists() {
        let store = Store::open_read_only(&db_path)?;
        for key in STATUS_META_KEYS {
            let value = store.get_meta(key).unwrap_or(None).unwrap_or_default();
            info!(key, value = %value, "meta");
        }
        for table in STATUS_TABLES {
            let count = store.table_count(table).unwrap_or(0);
            info!(table, rows = count, "table status");
        }
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}

fn load_manifest(path: &std::path::Path) -> Result<ArtifactManifest> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

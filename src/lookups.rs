//! Curated CSV reference data: static lookup tables and manual bio flags.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use rusqlite::types::Value as SqlValue;
use tracing::{info, warn};

use crate::config::StaticSource;
use crate::model::MappedRecord;
use crate::store::{BatchOutcome, Store};

/// Reads a headed CSV into records. Empty cells become NULL; rows that are
/// blank or carry a `#`-prefixed field are skipped.
pub fn read_csv_records(path: &Path) -> Result<Vec<MappedRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_owned)
        .collect::<Vec<String>>();

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("failed to read row {} of {}", index + 2, path.display()))?;
        if is_skipped_row(&row) {
            continue;
        }

        let mut record = MappedRecord::with_capacity(headers.len());
        for (column, cell) in headers.iter().zip(row.iter()) {
            let value = if cell.is_empty() {
                SqlValue::Null
            } else {
                SqlValue::Text(cell.to_string())
            };
            record.push(column.clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}

fn is_skipped_row(row: &StringRecord) -> bool {
    row.iter().all(str::is_empty) || row.iter().any(|cell| cell.starts_with('#'))
}

/// Loads every configured static source. A missing file is a warning, not a
/// failure; unreadable files and write failures come back as error strings.
pub fn load_static_sources(
    store: &mut Store,
    sources: &BTreeMap<String, StaticSource>,
) -> (BTreeMap<String, usize>, Vec<String>) {
    let mut counts = BTreeMap::new();
    let mut errors = Vec::new();

    for (name, source) in sources {
        if !source.file.exists() {
            warn!(source = %name, path = %source.file.display(), "static source file missing, skipping");
            counts.insert(source.table.clone(), 0);
            continue;
        }

        match load_csv_into(store, &source.file, &source.table) {
            Ok(outcome) => {
                info!(
                    source = %name,
                    table = %source.table,
                    inserted = outcome.inserted,
                    failed = outcome.failed,
                    "loaded static source"
                );
                counts.insert(source.table.clone(), outcome.inserted);
            }
            Err(err) => {
                warn!(source = %name, error = %format!("{err:#}"), "failed to load static source");
                errors.push(format!("static source {name}: {err:#}"));
            }
        }
    }

    (counts, errors)
}

fn load_csv_into(store: &mut Store, path: &Path, table: &str) -> Result<BatchOutcome> {
    let records = read_csv_records(path)?;
    store.upsert_batch(table, &records)
}

/// Manual bio classification rows. They go in with first-write precedence so a
/// curated row can never be replaced by a heuristic one.
pub fn read_bio_flags(path: &Path) -> Result<Vec<MappedRecord>> {
    let records = read_csv_records(path)?;
    Ok(records.into_iter().map(normalize_bio_flag).collect())
}

fn normalize_bio_flag(record: MappedRecord) -> MappedRecord {
    let mut out = MappedRecord::with_capacity(record.len() + 1);
    let mut has_source = false;
    for (column, value) in record.into_fields() {
        let value = match (column.as_str(), value) {
            ("is_bio", SqlValue::Text(text)) => SqlValue::Integer(i64::from(parse_flag(&text))),
            ("source", value) => {
                has_source = true;
                value
            }
            (_, value) => value,
        };
        out.push(column, value);
    }
    if !has_source {
        out.push("source", SqlValue::Text("manual".to_string()));
    }
    out
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "ja" | "y" | "x"
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::store::SCHEMA_SQL;

    fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("fixture should be written");
        path
    }

    #[test]
    fn read_csv_records_skips_comments_and_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "hinweise.csv",
            "hinweis_kode,hinweis_text\n# curated list,\nH300,Lebensgefahr bei Verschlucken.\n,\nH400,\n",
        );

        let records = read_csv_records(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].get("hinweis_kode"),
            Some(&SqlValue::Text("H300".to_string()))
        );
        assert_eq!(records[1].get("hinweis_text"), Some(&SqlValue::Null));
    }

    #[test]
    fn load_static_sources_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = write(
            dir.path(),
            "firmen.csv",
            "firma_name,website\nAgro GmbH,https://agro.example\n",
        );
        let sources = BTreeMap::from([
            (
                "vertriebsfirma".to_string(),
                StaticSource {
                    file: present,
                    table: "bvl_vertriebsfirma".to_string(),
                },
            ),
            (
                "ghs".to_string(),
                StaticSource {
                    file: dir.path().join("absent.csv"),
                    table: "bvl_lookup_ghs_hinweis".to_string(),
                },
            ),
        ]);
        let mut store = Store::open_in_memory().unwrap();
        store.init_schema(SCHEMA_SQL).unwrap();

        let (counts, errors) = load_static_sources(&mut store, &sources);

        assert!(errors.is_empty());
        assert_eq!(counts.get("bvl_vertriebsfirma"), Some(&1));
        assert_eq!(counts.get("bvl_lookup_ghs_hinweis"), Some(&0));
    }

    #[test]
    fn bio_flags_normalize_flag_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "bio.csv",
            "kennr,is_bio,certification_body,notes\n024266-00,true,DE-ÖKO-001,\n005555-00,0,,manually excluded\n",
        );

        let records = read_bio_flags(&path).unwrap();

        assert_eq!(records[0].get("is_bio"), Some(&SqlValue::Integer(1)));
        assert_eq!(records[1].get("is_bio"), Some(&SqlValue::Integer(0)));
        assert_eq!(
            records[0].get("source"),
            Some(&SqlValue::Text("manual".to_string()))
        );
    }
}

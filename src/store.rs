use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Params, params, params_from_iter};
use tracing::{debug, warn};

use crate::model::MappedRecord;
use crate::util::{now_utc_string, sql_identifier_regex};

/// Schema shipped with the binary; `sync --schema` can point at another file.
pub const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

pub type Row = BTreeMap<String, SqlValue>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    /// Rows dropped by `INSERT OR IGNORE` because the key already existed.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
    Replace,
    Ignore,
}

impl Conflict {
    fn clause(self) -> &'static str {
        match self {
            Self::Replace => "INSERT OR REPLACE",
            Self::Ignore => "INSERT OR IGNORE",
        }
    }
}

pub struct Store {
    conn: Connection,
    identifier: Regex,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        configure_connection(&conn)?;
        Self::from_connection(conn)
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database read-only: {}", path.display()))?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        Ok(Self {
            conn,
            identifier: sql_identifier_regex()?,
        })
    }

    pub fn init_schema(&self, schema_sql: &str) -> Result<()> {
        self.conn
            .execute_batch(schema_sql)
            .context("failed to initialize schema")
    }

    /// Inserts or replaces each record by primary key, one transaction per batch.
    /// A record that violates a constraint is logged and counted; the rest commit.
    pub fn upsert_batch(&mut self, table: &str, records: &[MappedRecord]) -> Result<BatchOutcome> {
        self.write_batch(Conflict::Replace, table, records)
    }

    /// Inserts records whose key is not present yet; existing rows win.
    pub fn insert_missing(
        &mut self,
        table: &str,
        records: &[MappedRecord],
    ) -> Result<BatchOutcome> {
        self.write_batch(Conflict::Ignore, table, records)
    }

    fn write_batch(
        &mut self,
        conflict: Conflict,
        table: &str,
        records: &[MappedRecord],
    ) -> Result<BatchOutcome> {
        if !self.identifier.is_match(table) {
            bail!("refusing to write to invalid table name: {table}");
        }

        let mut outcome = BatchOutcome::default();
        if records.is_empty() {
            return Ok(outcome);
        }

        let tx = self
            .conn
            .transaction()
            .with_context(|| format!("failed to begin transaction for {table}"))?;

        for (index, record) in records.iter().enumerate() {
            let Some(sql) = insert_sql(&self.identifier, conflict, table, record) else {
                warn!(table, index, "record has no columns or an invalid column name");
                outcome.failed += 1;
                continue;
            };

            let result = tx
                .prepare_cached(&sql)
                .and_then(|mut statement| statement.execute(params_from_iter(record.values())));
            match result {
                Ok(0) => outcome.skipped += 1,
                Ok(_) => outcome.inserted += 1,
                Err(err) => {
                    warn!(table, index, error = %err, "failed to write record");
                    outcome.failed += 1;
                }
            }
        }

        tx.commit()
            .with_context(|| format!("failed to commit batch for {table}"))?;

        debug!(
            table,
            inserted = outcome.inserted,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "batch written"
        );
        Ok(outcome)
    }

    /// Runs a read query. A failing query is an error, never an empty result.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Row>> {
        let mut statement = self
            .conn
            .prepare(sql)
            .with_context(|| format!("failed to prepare query: {sql}"))?;
        let columns = statement
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<String>>();

        let rows = statement
            .query_map(params, |row| {
                let mut out = Row::new();
                for (index, name) in columns.iter().enumerate() {
                    out.insert(name.clone(), row.get::<_, SqlValue>(index)?);
                }
                Ok(out)
            })
            .with_context(|| format!("failed to run query: {sql}"))?;

        rows.collect::<rusqlite::Result<Vec<Row>>>()
            .with_context(|| format!("failed to read rows: {sql}"))
    }

    /// Fail-soft variant of [`Store::query`]: errors are logged and read as no rows.
    pub fn query_or_empty<P: Params>(&self, sql: &str, params: P) -> Vec<Row> {
        match self.query(sql, params) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "query failed, treating as empty");
                Vec::new()
            }
        }
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.conn
            .execute(sql, params)
            .with_context(|| format!("failed to execute: {sql}"))
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO bvl_meta(key, value, updated_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
                params![key, value, now_utc_string()],
            )
            .with_context(|| format!("failed to write meta key {key}"))?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM bvl_meta WHERE key = ?1",
                [key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .with_context(|| format!("failed to read meta key {key}"))?;
        Ok(value.flatten())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.schema_object_exists("table", name)
    }

    pub fn view_exists(&self, name: &str) -> Result<bool> {
        self.schema_object_exists("view", name)
    }

    fn schema_object_exists(&self, kind: &str, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
                [kind, name],
                |_| Ok(()),
            )
            .optional()
            .with_context(|| format!("failed to look up {kind} {name}"))?;
        Ok(found.is_some())
    }

    pub fn table_count(&self, table: &str) -> Result<i64> {
        if !self.identifier.is_match(table) {
            bail!("refusing to count invalid table name: {table}");
        }
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.conn
            .query_row(&sql, [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))
    }

    /// Compacts the file and folds the WAL back in so the database file stands
    /// alone. Call only after the last write.
    pub fn vacuum(&self) -> Result<()> {
        self.conn
            .execute_batch("VACUUM;")
            .context("failed to vacuum database")?;
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            .context("failed to checkpoint WAL")?;
        let mode = self
            .conn
            .pragma_update_and_check(None, "journal_mode", "DELETE", |row| {
                row.get::<_, String>(0)
            })
            .context("failed to set journal_mode=DELETE")?;
        debug!(journal_mode = %mode, "database compacted");
        Ok(())
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn insert_sql(
    identifier: &Regex,
    conflict: Conflict,
    table: &str,
    record: &MappedRecord,
) -> Option<String> {
    if record.is_empty() || !record.columns().all(|column| identifier.is_match(column)) {
        return None;
    }

    let columns = record.columns().collect::<Vec<&str>>().join(", ");
    let placeholders = (1..=record.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<String>>()
        .join(", ");

    Some(format!(
        "{} INTO {table} ({columns}) VALUES ({placeholders})",
        conflict.clause()
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::mapper::{PAYLOAD_COLUMN, dispatch, known_endpoints, mapper_for};

    fn store() -> Store {
        let store = Store::open_in_memory().expect("in-memory store should open");
        store.init_schema(SCHEMA_SQL).expect("schema should apply");
        store
    }

    fn mittel(kennr: Option<&str>, name: &str) -> MappedRecord {
        let mut record = MappedRecord::new();
        record.push(
            "kennr",
            kennr.map_or(SqlValue::Null, |value| SqlValue::Text(value.to_string())),
        );
        record.push("mittelname", SqlValue::Text(name.to_string()));
        record
    }

    #[test]
    fn init_schema_is_idempotent() {
        let store = store();
        store
            .init_schema(SCHEMA_SQL)
            .expect("second schema run should succeed");
        assert!(store.table_exists("bvl_mittel").unwrap());
        assert!(store.view_exists("bvl_mittel_extras").unwrap());
        assert!(!store.table_exists("bvl_mittel_extras").unwrap());
    }

    #[test]
    fn upsert_batch_is_idempotent() {
        let mut store = store();
        let records = vec![mittel(Some("A"), "Alpha"), mittel(Some("B"), "Beta")];

        let first = store.upsert_batch("bvl_mittel", &records).unwrap();
        let second = store.upsert_batch("bvl_mittel", &records).unwrap();

        assert_eq!(first.inserted, 2);
        assert_eq!(second.inserted, 2);
        assert_eq!(store.table_count("bvl_mittel").unwrap(), 2);
    }

    #[test]
    fn upsert_batch_replaces_by_key() {
        let mut store = store();
        store
            .upsert_batch("bvl_mittel", &[mittel(Some("A"), "Old")])
            .unwrap();
        store
            .upsert_batch("bvl_mittel", &[mittel(Some("A"), "New")])
            .unwrap();

        let rows = store
            .query("SELECT mittelname FROM bvl_mittel WHERE kennr = ?1", ["A"])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].get("mittelname"),
            Some(&SqlValue::Text("New".to_string()))
        );
    }

    #[test]
    fn failing_record_does_not_abort_batch() {
        let mut store = store();
        let records = vec![
            mittel(Some("A"), "Alpha"),
            mittel(None, "No key"),
            mittel(Some("C"), "Gamma"),
        ];

        let outcome = store.upsert_batch("bvl_mittel", &records).unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(store.table_count("bvl_mittel").unwrap(), 2);
    }

    #[test]
    fn insert_missing_keeps_existing_rows() {
        let mut store = store();
        store
            .insert_missing("bvl_mittel", &[mittel(Some("A"), "First")])
            .unwrap();
        let outcome = store
            .insert_missing(
                "bvl_mittel",
                &[mittel(Some("A"), "Second"), mittel(Some("B"), "Beta")],
            )
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 1);
        let rows = store
            .query("SELECT mittelname FROM bvl_mittel WHERE kennr = 'A'", [])
            .unwrap();
        assert_eq!(
            rows[0].get("mittelname"),
            Some(&SqlValue::Text("First".to_string()))
        );
    }

    #[test]
    fn invalid_identifiers_are_rejected() {
        let mut store = store();
        let err = store
            .upsert_batch("bvl_mittel; DROP TABLE bvl_meta", &[mittel(Some("A"), "x")])
            .unwrap_err();
        assert!(err.to_string().contains("invalid table name"));

        let mut bad_column = MappedRecord::new();
        bad_column.push("kennr) VALUES ('x'); --", SqlValue::Null);
        let outcome = store.upsert_batch("bvl_mittel", &[bad_column]).unwrap();
        assert_eq!(outcome.failed, 1);
        assert!(store.table_count("x; --").is_err());
    }

    #[test]
    fn query_error_is_distinct_from_no_rows() {
        let store = store();

        let empty = store.query("SELECT * FROM bvl_mittel", []).unwrap();
        assert!(empty.is_empty());

        assert!(store.query("SELECT * FROM missing_table", []).is_err());
        assert!(
            store
                .query_or_empty("SELECT * FROM missing_table", [])
                .is_empty()
        );
    }

    #[test]
    fn meta_is_last_write_wins() {
        let store = store();
        assert_eq!(store.get_meta("lastSyncIso").unwrap(), None);

        store.set_meta("lastSyncIso", "2026-01-01T00:00:00Z").unwrap();
        store.set_meta("lastSyncIso", "2026-02-01T00:00:00Z").unwrap();

        assert_eq!(
            store.get_meta("lastSyncIso").unwrap().as_deref(),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(store.table_count("bvl_meta").unwrap(), 1);
    }

    #[test]
    fn every_mapper_column_exists_in_schema() {
        let store = store();

        for endpoint in known_endpoints() {
            let table = format!("bvl_{endpoint}");
            let rows = store
                .query(&format!("PRAGMA table_info({table})"), [])
                .unwrap();
            let columns = rows
                .iter()
                .filter_map(|row| match row.get("name") {
                    Some(SqlValue::Text(name)) => Some(name.clone()),
                    _ => None,
                })
                .collect::<HashSet<String>>();
            assert!(!columns.is_empty(), "table {table} is missing");

            let mapper = mapper_for(endpoint).unwrap();
            for column in mapper.column_names() {
                assert!(columns.contains(column), "{table} lacks column {column}");
            }
            if matches!(
                endpoint,
                "awg_kultur" | "awg_schadorg" | "awg_aufwand" | "awg_wartezeit" | "mittel_vertrieb"
            ) {
                assert!(!columns.contains(PAYLOAD_COLUMN));
            } else {
                assert!(columns.contains(PAYLOAD_COLUMN), "{table} lacks payload_json");
            }
        }
    }

    #[test]
    fn reloading_records_without_optional_key_parts_keeps_one_row() {
        let mut store = store();
        let cases = [
            ("awg_aufwand", serde_json::json!({ "awg_id": "A1", "sortier_nr": 1, "m_aufwand": 2.0 })),
            ("awg_kultur", serde_json::json!({ "awg_id": "A1", "kultur": "TRZAW", "sortier_nr": 1 })),
            ("awg_schadorg", serde_json::json!({ "awg_id": "A1", "schadorg": "PHYTIN" })),
            ("parallelimport_gueltig", serde_json::json!({ "kennr": "024266-00" })),
        ];

        for (endpoint, value) in cases {
            let raw = value.as_object().cloned().expect("record should be an object");
            let record = dispatch(endpoint, &raw).unwrap();
            let table = format!("bvl_{endpoint}");
            for _ in 0..2 {
                let outcome = store.upsert_batch(&table, std::slice::from_ref(&record)).unwrap();
                assert_eq!(outcome.failed, 0, "{table}");
            }
            assert_eq!(store.table_count(&table).unwrap(), 1, "{table}");
        }
    }

    #[test]
    fn composite_key_columns_are_not_null() {
        let store = store();
        let tables = store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'bvl_%'",
                [],
            )
            .unwrap();

        for table in tables.iter().filter_map(|row| match row.get("name") {
            Some(SqlValue::Text(name)) => Some(name.clone()),
            _ => None,
        }) {
            let key_columns = store
                .query(
                    "SELECT name, \"notnull\" AS not_null FROM pragma_table_info(?1) WHERE pk > 0",
                    [&table],
                )
                .unwrap();
            if key_columns.len() < 2 {
                continue;
            }
            for column in &key_columns {
                assert_eq!(
                    column.get("not_null"),
                    Some(&SqlValue::Integer(1)),
                    "{table}.{:?} is part of the key but nullable",
                    column.get("name")
                );
            }
        }
    }

    #[test]
    fn vacuum_runs_on_populated_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bvl.sqlite");
        let mut store = Store::open(&path).unwrap();
        store.init_schema(SCHEMA_SQL).unwrap();
        store
            .upsert_batch("bvl_mittel", &[mittel(Some("A"), "Alpha")])
            .unwrap();

        store.vacuum().unwrap();

        let wal = dir.path().join("bvl.sqlite-wal");
        assert!(!wal.exists() || std::fs::metadata(&wal).unwrap().len() == 0);
        assert_eq!(store.table_count("bvl_mittel").unwrap(), 1);
    }
}

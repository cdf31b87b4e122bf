//! Post-load enrichment: lookup denormalization, derived code lookups and
//! bio classification. Every pass only fills gaps, so running the engine
//! again leaves the database unchanged.

use anyhow::{Context, Result};
use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use tracing::{info, warn};

use crate::config::{BioHeuristicsSettings, EnrichmentsConfig};
use crate::lookups::read_bio_flags;
use crate::model::MappedRecord;
use crate::store::Store;

const ENRICHMENTS_TABLE: &str = "bvl_mittel_enrichments";
const HEURISTIC_NOTE: &str = "Detected by name pattern";

/// Copies `lookup.source_column` into `fact.target_column` where the target is
/// still NULL.
#[derive(Debug, Clone, Copy)]
pub struct DenormPass {
    pub name: &'static str,
    pub fact_table: &'static str,
    pub fact_key: &'static str,
    pub lookup_table: &'static str,
    pub lookup_key: &'static str,
    pub source_column: &'static str,
    pub target_column: &'static str,
}

impl DenormPass {
    fn sql(&self) -> String {
        let Self {
            fact_table: fact,
            fact_key,
            lookup_table: lookup,
            lookup_key,
            source_column: source,
            target_column: target,
            ..
        } = *self;
        format!(
            "UPDATE {fact} SET {target} = (
               SELECT l.{source} FROM {lookup} l
               WHERE l.{lookup_key} = {fact}.{fact_key} AND l.{source} IS NOT NULL
               LIMIT 1
             )
             WHERE {target} IS NULL
               AND {fact_key} IS NOT NULL
               AND EXISTS (
                 SELECT 1 FROM {lookup} l
                 WHERE l.{lookup_key} = {fact}.{fact_key} AND l.{source} IS NOT NULL
               )"
        )
    }
}

/// Order matters: the website pass keys on the firm name filled just before it.
pub const DENORM_PASSES: &[DenormPass] = &[
    DenormPass {
        name: "wirkstoff_gehalt.wirkstoffname",
        fact_table: "bvl_wirkstoff_gehalt",
        fact_key: "wirknr",
        lookup_table: "bvl_wirkstoff",
        lookup_key: "wirknr",
        source_column: "wirkstoffname",
        target_column: "wirkstoffname",
    },
    DenormPass {
        name: "ghs_gefahrenhinweise.hinweis_text",
        fact_table: "bvl_ghs_gefahrenhinweise",
        fact_key: "hinweis_kode",
        lookup_table: "bvl_lookup_ghs_hinweis",
        lookup_key: "hinweis_kode",
        source_column: "hinweis_text",
        target_column: "hinweis_text",
    },
    DenormPass {
        name: "mittel_vertrieb.firma_name",
        fact_table: "bvl_mittel_vertrieb",
        fact_key: "vertriebsfirma_nr",
        lookup_table: "bvl_adresse",
        lookup_key: "adresse_nr",
        source_column: "name",
        target_column: "firma_name",
    },
    DenormPass {
        name: "mittel_vertrieb.website",
        fact_table: "bvl_mittel_vertrieb",
        fact_key: "firma_name",
        lookup_table: "bvl_vertriebsfirma",
        lookup_key: "firma_name",
        source_column: "website",
        target_column: "website",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct DerivedLookup {
    pub target_table: &'static str,
    pub kodeliste: i64,
    pub sprache: &'static str,
}

pub const DERIVED_LOOKUPS: &[DerivedLookup] = &[
    DerivedLookup {
        target_table: "bvl_lookup_kultur",
        kodeliste: 51,
        sprache: "DE",
    },
    DerivedLookup {
        target_table: "bvl_lookup_schadorg",
        kodeliste: 52,
        sprache: "DE",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub name: String,
    pub affected: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentReport {
    pub passes: Vec<PassReport>,
    pub errors: Vec<String>,
}

impl EnrichmentReport {
    fn record(&mut self, name: &str, result: Result<usize>) {
        match result {
            Ok(affected) => {
                info!(pass = name, affected, "enrichment pass complete");
                self.passes.push(PassReport {
                    name: name.to_string(),
                    affected,
                });
            }
            Err(err) => {
                warn!(pass = name, error = %format!("{err:#}"), "enrichment pass failed");
                self.errors.push(format!("enrichment pass {name}: {err:#}"));
            }
        }
    }

    #[cfg(test)]
    pub fn affected(&self, name: &str) -> Option<usize> {
        self.passes
            .iter()
            .find(|pass| pass.name == name)
            .map(|pass| pass.affected)
    }
}

/// Case-insensitive substring classifier over product names.
#[derive(Debug, Clone)]
pub struct BioHeuristic {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl BioHeuristic {
    /// `None` when heuristics are disabled or there is nothing to match on.
    pub fn from_settings(settings: &BioHeuristicsSettings) -> Option<Self> {
        if !settings.enabled {
            return None;
        }
        let include = lowercase_patterns(&settings.name_patterns);
        if include.is_empty() {
            return None;
        }
        Some(Self {
            include,
            exclude: lowercase_patterns(&settings.exclude_patterns),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.include.iter().any(|pattern| name.contains(pattern.as_str()))
            && !self.exclude.iter().any(|pattern| name.contains(pattern.as_str()))
    }
}

fn lowercase_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .filter(|pattern| !pattern.is_empty())
        .collect()
}

pub struct EnrichmentEngine<'a> {
    config: &'a EnrichmentsConfig,
}

impl<'a> EnrichmentEngine<'a> {
    pub fn new(config: &'a EnrichmentsConfig) -> Self {
        Self { config }
    }

    /// Runs every pass in order. A failing pass is reported and the rest
    /// still run.
    pub fn run(&self, store: &mut Store) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        for pass in DENORM_PASSES {
            report.record(pass.name, store.execute(&pass.sql(), []));
        }

        for lookup in DERIVED_LOOKUPS {
            let sql = format!(
                "INSERT OR REPLACE INTO {}(code, label)
                 SELECT kode, kodetext FROM bvl_kode
                 WHERE kodeliste = ?1 AND sprache = ?2",
                lookup.target_table
            );
            report.record(
                lookup.target_table,
                store.execute(&sql, params![lookup.kodeliste, lookup.sprache]),
            );
        }

        report.record("bio_flags", self.apply_manual_flags(store));

        if let Some(heuristic) = BioHeuristic::from_settings(&self.config.bio_heuristics) {
            report.record("bio_heuristics", apply_heuristic(store, &heuristic));
        }

        report
    }

    fn apply_manual_flags(&self, store: &mut Store) -> Result<usize> {
        let Some(source) = &self.config.bio_flags else {
            return Ok(0);
        };
        if !source.file.exists() {
            info!(path = %source.file.display(), "no bio flags file, skipping manual flags");
            return Ok(0);
        }

        let records = read_bio_flags(&source.file)?;
        let outcome = store.insert_missing(ENRICHMENTS_TABLE, &records)?;
        if outcome.failed > 0 {
            warn!(failed = outcome.failed, "some bio flag rows were rejected");
        }
        Ok(outcome.inserted)
    }
}

/// Classifies unflagged products in Rust; patterns never reach SQL text.
fn apply_heuristic(store: &mut Store, heuristic: &BioHeuristic) -> Result<usize> {
    let candidates = store
        .query(
            "SELECT m.kennr, m.mittelname FROM bvl_mittel m
             WHERE m.mittelname IS NOT NULL
               AND NOT EXISTS (SELECT 1 FROM bvl_mittel_enrichments e WHERE e.kennr = m.kennr)",
            [],
        )
        .context("failed to select bio candidates")?;

    let records = candidates
        .into_iter()
        .filter_map(|row| {
            let kennr = row.get("kennr").cloned()?;
            match row.get("mittelname") {
                Some(SqlValue::Text(name)) if heuristic.matches(name) => Some(kennr),
                _ => None,
            }
        })
        .map(|kennr| {
            let mut record = MappedRecord::with_capacity(4);
            record.push("kennr", kennr);
            record.push("is_bio", SqlValue::Integer(1));
            record.push("notes", SqlValue::Text(HEURISTIC_NOTE.to_string()));
            record.push("source", SqlValue::Text("heuristic".to_string()));
            record
        })
        .collect::<Vec<MappedRecord>>();

    let outcome = store.insert_missing(ENRICHMENTS_TABLE, &records)?;
    Ok(outcome.inserted)
}

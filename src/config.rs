use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::util::sql_identifier_regex;

pub const DEFAULT_PUBLISH_BASE_URL: &str = "https://abbas-hoseiny.github.io/pflanzenschutz-db";

/// Endpoint list plus fetch, static-source, publish and validation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    pub base_url: String,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,

    #[serde(default)]
    pub static_sources: BTreeMap<String, StaticSource>,

    #[serde(default)]
    pub publish: PublishSettings,

    #[serde(default)]
    pub validation: ValidationPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub path: String,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub page_size: usize,
    pub max_pages: Option<usize>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticSource {
    pub file: PathBuf,
    pub table: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub base_url: String,
    pub runner: String,
    pub api_version: String,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PUBLISH_BASE_URL.to_string(),
            runner: "local".to_string(),
            api_version: "v1".to_string(),
        }
    }
}

/// Tables, views and thresholds the validator checks an export against.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub required_tables: Vec<String>,
    pub required_views: Vec<String>,
    /// Critical table → minimum row count. Zero rows is an error, fewer than the
    /// minimum is a warning.
    pub critical_tables: BTreeMap<String, i64>,
    pub required_meta: Vec<String>,
    pub enrichment_columns: Vec<EnrichmentColumnCheck>,
    pub bio_view: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentColumnCheck {
    pub table: String,
    pub key_column: String,
    pub target_column: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        let required_tables = [
            "bvl_meta",
            "bvl_stand",
            "bvl_mittel",
            "bvl_awg",
            "bvl_awg_kultur",
            "bvl_awg_schadorg",
            "bvl_awg_aufwand",
            "bvl_awg_wartezeit",
            "bvl_wirkstoff",
            "bvl_wirkstoff_gehalt",
            "bvl_ghs_gefahrenhinweise",
            "bvl_lookup_ghs_hinweis",
            "bvl_vertriebsfirma",
            "bvl_mittel_vertrieb",
            "bvl_mittel_enrichments",
        ]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect();

        Self {
            required_tables,
            required_views: vec!["bvl_mittel_extras".to_string()],
            critical_tables: BTreeMap::from([
                ("bvl_mittel".to_string(), 100),
                ("bvl_awg".to_string(), 10),
            ]),
            required_meta: vec![
                "lastSyncIso".to_string(),
                "dataSource".to_string(),
                "dataSourceType".to_string(),
            ],
            enrichment_columns: vec![
                EnrichmentColumnCheck {
                    table: "bvl_wirkstoff_gehalt".to_string(),
                    key_column: "wirknr".to_string(),
                    target_column: "wirkstoffname".to_string(),
                },
                EnrichmentColumnCheck {
                    table: "bvl_ghs_gefahrenhinweise".to_string(),
                    key_column: "hinweis_kode".to_string(),
                    target_column: "hinweis_text".to_string(),
                },
            ],
            bio_view: "bvl_mittel_extras".to_string(),
        }
    }
}

impl EndpointsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::from_yaml(&raw)
            .with_context(|| format!("invalid endpoints config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw).context("failed to parse endpoints yaml")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if self.fetch.page_size == 0 {
            bail!("fetch.page_size must be greater than zero");
        }

        let identifier = sql_identifier_regex()?;
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                bail!("duplicate endpoint name: {}", endpoint.name);
            }
            if !identifier.is_match(&endpoint.table) {
                bail!(
                    "endpoint {} has invalid table name: {}",
                    endpoint.name,
                    endpoint.table
                );
            }
        }
        for (name, source) in &self.static_sources {
            if !identifier.is_match(&source.table) {
                bail!("static source {name} has invalid table name: {}", source.table);
            }
        }

        Ok(())
    }

    /// Endpoints in configured order, optionally narrowed to `only`.
    pub fn selected_endpoints<'a>(&'a self, only: &[String]) -> Vec<&'a EndpointDescriptor> {
        self.endpoints
            .iter()
            .filter(|endpoint| only.is_empty() || only.iter().any(|name| name == &endpoint.name))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichmentsConfig {
    #[serde(default)]
    pub bio_flags: Option<BioFlagsSource>,

    #[serde(default)]
    pub bio_heuristics: BioHeuristicsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BioFlagsSource {
    pub file: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BioHeuristicsSettings {
    pub enabled: bool,
    pub name_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

impl EnrichmentsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse enrichments config {}", path.display()))?;
        Ok(config)
    }
}

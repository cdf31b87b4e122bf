use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::SyncArgs;
use crate::commands::validate::{ValidationReport, validate_store};
use crate::config::{EndpointDescriptor, EndpointsConfig, EnrichmentsConfig};
use crate::enrich::{DERIVED_LOOKUPS, EnrichmentEngine};
use crate::fetch::Fetcher;
use crate::lookups::load_static_sources;
use crate::mapper::mapper_for;
use crate::model::{BuildStats, EndpointStats};
use crate::package::Packager;
use crate::store::{SCHEMA_SQL, Store};
use crate::util::{ensure_directory, now_utc_string};

/// Version of the table layout in `sql/schema.sql`, stored as `schemaVersion`.
pub const SCHEMA_VERSION: &str = "1.0.0";
pub const DATA_SOURCE: &str = "BVL PSM API";
pub const DATA_SOURCE_TYPE: &str = "api-v1";

mod pipeline;
mod run;

pub use self::pipeline::{Pipeline, SyncOptions};
pub use self::run::run;

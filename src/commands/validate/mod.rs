use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ValidateArgs;
use crate::config::{EndpointsConfig, ValidationPolicy};
use crate::store::Store;
use crate::util::{now_utc_string, sql_identifier_regex, write_json_pretty};

mod checks;
mod run;

pub use self::checks::validate_store;
pub use self::run::run;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
    pub table_counts: BTreeMap<String, i64>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn note(&mut self, message: String) {
        self.info.push(message);
    }

    pub fn log(&self) {
        for message in &self.errors {
            warn!(severity = "error", %message, "validation finding");
        }
        for message in &self.warnings {
            warn!(severity = "warning", %message, "validation finding");
        }
        for message in &self.info {
            info!(%message, "validation note");
        }
        info!(
            passed = self.passed(),
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "validation complete"
        );
    }
}

#[derive(Debug, Serialize)]
struct ValidationReportFile<'a> {
    generated_at: String,
    db_path: String,
    passed: bool,
    #[serde(flatten)]
    report: &'a ValidationReport,
}

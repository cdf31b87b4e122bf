use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};

/// One API record as received; consumed by a single mapper call.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Column/value pairs ready for insertion, in mapper column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRecord {
    fields: Vec<(String, SqlValue)>,
}

impl MappedRecord {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: SqlValue) {
        self.fields.push((column.into(), value));
    }

    #[cfg(test)]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn into_fields(self) -> Vec<(String, SqlValue)> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Success,
    Partial,
    Empty,
    Error,
}

impl EndpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStats {
    pub count: usize,
    pub failed: usize,
    pub status: EndpointStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointStats {
    pub fn success(count: usize, failed: usize) -> Self {
        Self {
            count,
            failed,
            status: EndpointStatus::Success,
            error: None,
        }
    }

    /// Some pages arrived before the fetch failed; what arrived was loaded.
    pub fn partial(count: usize, failed: usize, error: impl Into<String>) -> Self {
        Self {
            count,
            failed,
            status: EndpointStatus::Partial,
            error: Some(error.into()),
        }
    }

    pub fn empty() -> Self {
        Self {
            count: 0,
            failed: 0,
            status: EndpointStatus::Empty,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            count: 0,
            failed: 0,
            status: EndpointStatus::Error,
            error: Some(message.into()),
        }
    }
}

/// Run-wide accumulator. Stages hand back their contribution and the
/// orchestrator folds it in here.
#[derive(Debug, Clone)]
pub struct BuildStats {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub endpoints: BTreeMap<String, EndpointStats>,
    pub errors: Vec<String>,
}

impl BuildStats {
    pub fn start(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: None,
            endpoints: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Records an endpoint outcome; error-bearing outcomes also land in `errors`.
    pub fn record_endpoint(&mut self, name: &str, stats: EndpointStats) {
        if let Some(error) = &stats.error {
            self.errors.push(format!("{name}: {error}"));
        }
        self.endpoints.insert(name.to_string(), stats);
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn extend_errors<I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.errors.extend(errors);
    }

    pub fn finish(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactEncoding {
    Brotli,
    Zip,
}

impl ArtifactEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brotli => "brotli",
            Self::Zip => "zip",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Brotli => "br",
            Self::Zip => "zip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub sha256: String,
    pub encoding: ArtifactEncoding,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub runner: String,
    pub tool_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    pub api_version: String,
    pub generated_at: String,
    pub files: Vec<ManifestEntry>,
    pub tables: BTreeMap<String, i64>,
    pub build: BuildInfo,
}

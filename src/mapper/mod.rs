//! Endpoint → table-row transforms.
//!
//! Every endpoint has one [`RecordMapper`] in a static table. Mappers are pure:
//! they pick a fixed set of fields (absent or `null` fields become SQL NULL) and
//! most of them also keep the full source record as `payload_json`.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use thiserror::Error;

use crate::model::{MappedRecord, RawRecord};

mod registry;

use registry::MAPPERS;

pub const PAYLOAD_COLUMN: &str = "payload_json";

#[derive(Debug, Error)]
pub enum MapError {
    #[error("no mapper found for endpoint {0}")]
    UnknownEndpoint(String),

    #[error("{endpoint}: field {field} holds a nested {kind}, expected a scalar")]
    Malformed {
        endpoint: &'static str,
        field: &'static str,
        kind: &'static str,
    },

    #[error("{endpoint}: failed to serialize payload")]
    Payload {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    name: &'static str,
    source: &'static str,
    /// Stand-in for an absent value in a key column. SQLite treats NULLs in a
    /// composite primary key as distinct, so a NULL key would never conflict.
    key_default: Option<KeyDefault>,
}

#[derive(Debug, Clone, Copy)]
enum KeyDefault {
    Text(&'static str),
    Integer(i64),
}

impl KeyDefault {
    fn to_sql(self) -> SqlValue {
        match self {
            Self::Text(text) => SqlValue::Text(text.to_string()),
            Self::Integer(value) => SqlValue::Integer(value),
        }
    }
}

const fn col(name: &'static str) -> Column {
    Column {
        name,
        source: name,
        key_default: None,
    }
}

const fn renamed(name: &'static str, source: &'static str) -> Column {
    Column {
        name,
        source,
        key_default: None,
    }
}

const fn text_key(name: &'static str) -> Column {
    Column {
        name,
        source: name,
        key_default: Some(KeyDefault::Text("")),
    }
}

const fn flag_key(name: &'static str) -> Column {
    Column {
        name,
        source: name,
        key_default: Some(KeyDefault::Integer(0)),
    }
}

#[derive(Debug)]
pub struct RecordMapper {
    pub endpoint: &'static str,
    constants: &'static [(&'static str, i64)],
    columns: &'static [Column],
    keep_payload: bool,
}

impl RecordMapper {
    pub fn map(&self, raw: &RawRecord) -> Result<MappedRecord, MapError> {
        let mut record = MappedRecord::with_capacity(
            self.constants.len() + self.columns.len() + usize::from(self.keep_payload),
        );

        for (name, value) in self.constants {
            record.push(*name, SqlValue::Integer(*value));
        }

        for column in self.columns {
            let value = scalar_to_sql(raw.get(column.source)).map_err(|kind| {
                MapError::Malformed {
                    endpoint: self.endpoint,
                    field: column.source,
                    kind,
                }
            })?;
            let value = match (value, column.key_default) {
                (SqlValue::Null, Some(default)) => default.to_sql(),
                (value, _) => value,
            };
            record.push(column.name, value);
        }

        if self.keep_payload {
            let payload = serde_json::to_string(raw).map_err(|source| MapError::Payload {
                endpoint: self.endpoint,
                source,
            })?;
            record.push(PAYLOAD_COLUMN, SqlValue::Text(payload));
        }

        Ok(record)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constants
            .iter()
            .map(|(name, _)| *name)
            .chain(self.columns.iter().map(|column| column.name))
    }
}

pub fn mapper_for(endpoint: &str) -> Result<&'static RecordMapper, MapError> {
    MAPPERS
        .iter()
        .find(|mapper| mapper.endpoint == endpoint)
        .ok_or_else(|| MapError::UnknownEndpoint(endpoint.to_string()))
}

pub fn dispatch(endpoint: &str, raw: &RawRecord) -> Result<MappedRecord, MapError> {
    mapper_for(endpoint)?.map(raw)
}

pub fn known_endpoints() -> impl Iterator<Item = &'static str> {
    MAPPERS.iter().map(|mapper| mapper.endpoint)
}

fn scalar_to_sql(value: Option<&Value>) -> Result<SqlValue, &'static str> {
    match value {
        None | Some(Value::Null) => Ok(SqlValue::Null),
        Some(Value::Bool(flag)) => Ok(SqlValue::Integer(i64::from(*flag))),
        Some(Value::Number(number)) => Ok(match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(f64::NAN)),
        }),
        Some(Value::String(text)) => Ok(SqlValue::Text(text.clone())),
        Some(Value::Array(_)) => Err("array"),
        Some(Value::Object(_)) => Err("object"),
    }
}

//! Query and result types exchanged with tablets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single typed value, used both for bind variables and result cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One planned query bound to concrete values, ready for one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundQuery {
    pub sql: String,
    #[serde(default)]
    pub bind_vars: HashMap<String, Value>,
}

impl BoundQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bind_vars: HashMap::new(),
        }
    }

    pub fn with_bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind_vars.insert(name.into(), value);
        self
    }
}

/// Result-set column description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub column_type: String,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// A (possibly partial) result set from one or more tablets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub insert_id: u64,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a per-shard result into this accumulated one. Fields come
    /// from the first result that carries any; rows concatenate in
    /// arrival order; affected counts add up; the last nonzero insert
    /// id wins.
    pub fn append(&mut self, other: &QueryResult) {
        if self.fields.is_empty() {
            self.fields = other.fields.clone();
        }
        self.rows.extend(other.rows.iter().cloned());
        self.rows_affected += other.rows_affected;
        if other.insert_id != 0 {
            self.insert_id = other.insert_id;
        }
    }
}

/// Per-session execution options passed through to every tablet call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default)]
    pub workload: Workload,
    /// Ask the server to report matched rows instead of changed rows.
    #[serde(default)]
    pub client_found_rows: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    #[default]
    Oltp,
    Olap,
    Dba,
}

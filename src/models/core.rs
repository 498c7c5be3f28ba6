// src/models/core.rs
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::errors::{DedupeError, Result};
use crate::matching::normalize::normalize_value;

pub type RecordId = String;

/// A single input row after normalization. Field values are `None` when the
/// raw text normalized to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: BTreeMap<String, Option<String>>,
}

impl Record {
    /// Builds a record from raw field text, normalizing every value.
    pub fn new<I, K, V>(id: impl Into<RecordId>, raw_fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let fields = raw_fields
            .into_iter()
            .map(|(k, v)| (k.into(), normalize_value(v.as_ref())))
            .collect();
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }
}

/// The loaded input, addressable both by position and by record id.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
    index: HashMap<RecordId, usize>,
}

impl RecordSet {
    /// Loads raw key/value rows, taking each record's identifier from `id_field`.
    /// A row without an identifier, or a repeated identifier, is an input error.
    pub fn from_rows<I, R>(rows: I, id_field: &str) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (String, String)>,
    {
        let mut records = Vec::new();
        for (row_number, row) in rows.into_iter().enumerate() {
            let raw: Vec<(String, String)> = row.into_iter().collect();
            let id = raw
                .iter()
                .find(|(k, _)| k == id_field)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    DedupeError::Input(format!(
                        "row {} has no value for identifier field '{}'",
                        row_number + 1,
                        id_field
                    ))
                })?;
            records.push(Record::new(id, raw));
        }
        Self::from_records(records)
    }

    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), idx).is_some() {
                return Err(DedupeError::Input(format!(
                    "duplicate record identifier '{}'",
                    record.id
                )));
            }
        }
        Ok(Self { records, index })
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.index.get(id).map(|&idx| &self.records[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How two values of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparatorKind {
    /// Jaro-Winkler similarity.
    #[default]
    String,
    /// 1.0 on equality, 0.0 otherwise.
    Exact,
    /// Jaccard overlap of the token sets.
    Text,
}

impl ComparatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparatorKind::String => "string",
            ComparatorKind::Exact => "exact",
            ComparatorKind::Text => "text",
        }
    }
}

impl fmt::Display for ComparatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparatorKind {
    type Err = DedupeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(ComparatorKind::String),
            "exact" => Ok(ComparatorKind::Exact),
            "text" => Ok(ComparatorKind::Text),
            other => Err(DedupeError::Input(format!(
                "unknown comparator kind '{}' (expected string, exact or text)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: ComparatorKind,
    pub has_missing: bool,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: ComparatorKind) -> Self {
        Self {
            name: name.into(),
            kind,
            has_missing: false,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ComparatorKind::String)
    }

    pub fn with_missing(mut self) -> Self {
        self.has_missing = true;
        self
    }

    /// Parses a `name` or `name:kind` field descriptor.
    pub fn parse_descriptor(descriptor: &str, has_missing: bool) -> Result<Self> {
        let (name, kind) = match descriptor.split_once(':') {
            Some((name, kind)) => (name.trim(), kind.parse()?),
            None => (descriptor.trim(), ComparatorKind::default()),
        };
        if name.is_empty() {
            return Err(DedupeError::Input(format!(
                "field descriptor '{}' has no field name",
                descriptor
            )));
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            has_missing,
        })
    }
}

/// The ordered field definitions of a run. The order fixes the feature layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: Vec<FieldDefinition>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Result<Self> {
        if fields.is_empty() {
            return Err(DedupeError::Input(
                "at least one field must be configured for comparison".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(DedupeError::Input(format!(
                    "field '{}' is configured more than once",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of features one comparison produces: one similarity per field plus
    /// one missing indicator per field that allows missing values.
    pub fn feature_len(&self) -> usize {
        self.fields
            .iter()
            .map(|f| if f.has_missing { 2 } else { 1 })
            .sum()
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.feature_len());
        for field in &self.fields {
            names.push(field.name.clone());
            if field.has_missing {
                names.push(format!("{}:missing", field.name));
            }
        }
        names
    }

    /// SHA-256 over the ordered field definitions.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for field in &self.fields {
            hasher.update(
                format!("{}:{}:{}\n", field.name, field.kind, field.has_missing).as_bytes(),
            );
        }
        hex::encode(hasher.finalize())
    }
}

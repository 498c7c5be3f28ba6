// src/io/csv_input.rs
use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::path::Path;

use crate::models::core::{FieldSchema, RecordSet};

/// A delimited file as read: header names plus raw string rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub fn read_csv(path: &Path) -> Result<InputTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open input file {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut short_rows = 0;
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {} of {}", line + 1, path.display()))?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() < headers.len() {
            short_rows += 1;
            row.resize(headers.len(), String::new());
        }
        rows.push(row);
    }
    if short_rows > 0 {
        warn!("{} rows of {} had fewer columns than the header; missing values left empty", short_rows, path.display());
    }
    info!("Read {} rows with {} columns from {}", rows.len(), headers.len(), path.display());
    Ok(InputTable { headers, rows })
}

impl InputTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Fails when the identifier column or a configured field is not in the header.
    pub fn check_columns(&self, schema: &FieldSchema, id_field: &str) -> Result<()> {
        if self.column(id_field).is_none() {
            bail!("Identifier field '{}' is not a column of the input", id_field);
        }
        let missing: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| self.column(name).is_none())
            .collect();
        if !missing.is_empty() {
            bail!("Configured fields missing from the input: {}", missing.join(", "));
        }
        Ok(())
    }

    pub fn record_set(&self, id_field: &str) -> crate::errors::Result<RecordSet> {
        RecordSet::from_rows(
            self.rows
                .iter()
                .map(|row| self.headers.iter().cloned().zip(row.iter().cloned())),
            id_field,
        )
    }

    /// Identifier of each row, in row order.
    pub fn row_ids(&self, id_field: &str) -> Vec<Option<String>> {
        let idx = self.column(id_field);
        self.rows
            .iter()
            .map(|row| idx.and_then(|i| row.get(i)).map(|v| v.trim().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::FieldDefinition;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_reads_rows_and_builds_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.csv");
        fs::write(
            &path,
            "listing_id,name,phone_number\n1,\"Joe's  Pizza\",555\n2,Café Roma\n",
        )
        .unwrap();

        let table = read_csv(&path).unwrap();
        assert_eq!(table.headers, vec!["listing_id", "name", "phone_number"]);
        assert_eq!(table.rows[1], vec!["2", "Café Roma", ""]);

        let schema = FieldSchema::new(vec![FieldDefinition::string("name")]).unwrap();
        table.check_columns(&schema, "listing_id").unwrap();
        assert!(table.check_columns(&schema, "id").is_err());

        let records = table.record_set("listing_id").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records.get("1").unwrap().value("name"), Some("joe's pizza"));
        assert_eq!(records.get("2").unwrap().value("name"), Some("cafe roma"));
        assert_eq!(records.get("2").unwrap().value("phone_number"), None);
        assert_eq!(table.row_ids("listing_id"), vec![Some("1".to_string()), Some("2".to_string())]);
    }

    #[test]
    fn test_missing_identifier_is_an_input_error() {
        let table = InputTable {
            headers: vec!["listing_id".to_string(), "name".to_string()],
            rows: vec![vec!["".to_string(), "x".to_string()]],
        };
        assert!(matches!(
            table.record_set("listing_id"),
            Err(crate::errors::DedupeError::Input(_))
        ));
    }
}

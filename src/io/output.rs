// src/io/output.rs
use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::clustering::entity_clustering::Membership;
use crate::io::csv_input::InputTable;
use crate::models::core::RecordId;

#[derive(Serialize)]
struct MembershipEntry {
    cluster_id: usize,
    confidence_score: f64,
}

/// Writes cluster memberships next to the input. A `.csv` path gets the
/// input rows with `Cluster ID` and `confidence_score` columns in front; any
/// other path gets a JSON object keyed by record id.
pub fn write_results(
    path: &Path,
    table: &InputTable,
    id_field: &str,
    memberships: &BTreeMap<RecordId, Membership>,
) -> Result<()> {
    let is_csv = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_csv(path, table, id_field, memberships)?;
    } else {
        write_json(path, memberships)?;
    }
    info!("Wrote {} memberships to {}", memberships.len(), path.display());
    Ok(())
}

fn write_csv(
    path: &Path,
    table: &InputTable,
    id_field: &str,
    memberships: &BTreeMap<RecordId, Membership>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let mut header = vec!["Cluster ID".to_string(), "confidence_score".to_string()];
    header.extend(table.headers.iter().cloned());
    writer.write_record(&header)?;

    for (row, id) in table.rows.iter().zip(table.row_ids(id_field)) {
        let (cluster_id, confidence) = match id.as_deref().and_then(|id| memberships.get(id)) {
            Some(Membership::Clustered {
                cluster_id,
                confidence,
            }) => (cluster_id.to_string(), format!("{:.6}", confidence)),
            _ => (String::new(), String::new()),
        };
        let mut out = vec![cluster_id, confidence];
        out.extend(row.iter().cloned());
        writer.write_record(&out)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    Ok(())
}

fn write_json(path: &Path, memberships: &BTreeMap<RecordId, Membership>) -> Result<()> {
    let entries: BTreeMap<&str, Option<MembershipEntry>> = memberships
        .iter()
        .map(|(id, membership)| {
            let entry = match membership {
                Membership::Clustered {
                    cluster_id,
                    confidence,
                } => Some(MembershipEntry {
                    cluster_id: *cluster_id,
                    confidence_score: *confidence,
                }),
                Membership::Unclustered => None,
            };
            (id.as_str(), entry)
        })
        .collect();
    let file = File::create(path).with_context(|| format!("Failed to create output file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &entries)
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn table() -> InputTable {
        InputTable {
            headers: vec!["listing_id".to_string(), "name".to_string()],
            rows: vec![
                vec!["1".to_string(), "Joe".to_string()],
                vec!["2".to_string(), "joe".to_string()],
                vec!["3".to_string(), "Ann".to_string()],
            ],
        }
    }

    fn memberships() -> BTreeMap<RecordId, Membership> {
        let clustered = Membership::Clustered {
            cluster_id: 0,
            confidence: 0.75,
        };
        BTreeMap::from([
            ("1".to_string(), clustered.clone()),
            ("2".to_string(), clustered),
            ("3".to_string(), Membership::Unclustered),
        ])
    }

    #[test]
    fn test_csv_output_prepends_cluster_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_results(&path, &table(), "listing_id", &memberships()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Cluster ID,confidence_score,listing_id,name");
        assert_eq!(lines[1], "0,0.750000,1,Joe");
        assert_eq!(lines[3], ",,3,Ann");
    }

    #[test]
    fn test_json_output_is_keyed_by_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_results(&path, &table(), "listing_id", &memberships()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["1"]["cluster_id"], 0);
        assert_eq!(value["2"]["confidence_score"], 0.75);
        assert!(value["3"].is_null());
    }
}

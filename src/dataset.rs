//! Simulated table: one real-valued column per graph node.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use statrs::statistics::Statistics;

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    rows: usize,
    columns: BTreeMap<String, Vec<f64>>,
}

/// Descriptive statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl Dataset {
    pub(crate) fn from_columns(rows: usize, columns: BTreeMap<String, Vec<f64>>) -> Self {
        debug_assert!(columns.values().all(|c| c.len() == rows));
        Self { rows, columns }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column names in header order (lexicographic).
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn columns(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.columns
    }

    pub fn summaries(&self) -> Vec<ColumnSummary> {
        self.columns
            .iter()
            .map(|(name, values)| ColumnSummary {
                name: name.clone(),
                mean: values.iter().mean(),
                std_dev: values.iter().std_dev(),
                min: Statistics::min(values.iter()),
                max: Statistics::max(values.iter()),
            })
            .collect()
    }

    /// Header row of node names, then one comma-separated row per unit.
    pub fn write_csv<W: Write>(&self, writer: W) -> io::Result<()> {
        let mut writer = BufWriter::new(writer);
        let names: Vec<&str> = self.column_names().collect();
        writeln!(writer, "{}", names.join(","))?;

        let cols: Vec<&[f64]> = self.columns.values().map(Vec::as_slice).collect();
        for row in 0..self.rows {
            for (idx, col) in cols.iter().enumerate() {
                if idx > 0 {
                    writer.write_all(b",")?;
                }
                write!(writer, "{}", col[row])?;
            }
            writeln!(writer)?;
        }
        writer.flush()
    }

    pub fn write_csv_path(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        self.write_csv(file)
    }
}

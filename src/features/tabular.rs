//! CSV-backed feature extractor
//!
//! Reads a flat, already-denormalized table with polars. One row is one
//! historical record: a date column, a label column, an optional free-text
//! description and one numeric column per feature.

use super::{feature_names, FeatureExtractor};
use crate::dataset::LabeledSample;
use crate::error::{LedgerMlError, Result};
use crate::text::normalize;
use crate::training::{DateRange, ModelKind};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Value substituted for missing numeric cells
const MISSING_FEATURE: f64 = 0.0;

/// Load a CSV file with a header row
pub fn load_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| LedgerMlError::DataError(format!("cannot open {}: {}", path.display(), e)))?;

    let reader = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .into_reader_with_file_handle(file);

    reader.finish().map_err(|e| LedgerMlError::DataError(e.to_string()))
}

/// Column names used by [`TabularExtractor`]
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub date: String,
    pub label: String,
    /// Description column; required for categorization only
    pub text: Option<String>,
    pub features: Vec<String>,
}

impl ColumnMapping {
    /// Conventional layout: `date`, `label`, `description` and the kind's feature table
    pub fn for_kind(kind: ModelKind) -> Self {
        Self {
            date: "date".to_string(),
            label: "label".to_string(),
            text: match kind {
                ModelKind::Categorization => Some("description".to_string()),
                _ => None,
            },
            features: feature_names(kind),
        }
    }
}

/// One raw row as read from the table
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRecord {
    pub row: usize,
    pub date: Option<NaiveDate>,
    pub label: Option<String>,
    pub text: Option<String>,
    pub values: Vec<Option<f64>>,
}

/// Feature extractor over an in-memory table
#[derive(Debug, Clone)]
pub struct TabularExtractor {
    kind: ModelKind,
    mapping: ColumnMapping,
    records: Vec<TabularRecord>,
    categories: Vec<String>,
}

impl TabularExtractor {
    /// Load `path` and map it with the conventional column layout
    pub fn from_csv(path: impl AsRef<Path>, kind: ModelKind) -> Result<Self> {
        let df = load_csv(path)?;
        Self::from_frame(&df, kind, ColumnMapping::for_kind(kind))
    }

    pub fn from_frame(df: &DataFrame, kind: ModelKind, mapping: ColumnMapping) -> Result<Self> {
        let n_rows = df.height();
        let dates = string_column(df, &mapping.date)?;
        let labels = string_column(df, &mapping.label)?;
        let texts = match &mapping.text {
            Some(name) => string_column(df, name)?,
            None => vec![None; n_rows],
        };
        let columns = mapping
            .features
            .iter()
            .map(|name| float_column(df, name))
            .collect::<Result<Vec<_>>>()?;

        let records: Vec<TabularRecord> = (0..n_rows)
            .map(|row| TabularRecord {
                row,
                date: dates[row]
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
                label: labels[row].clone(),
                text: texts[row].clone(),
                values: columns.iter().map(|col| col[row]).collect(),
            })
            .collect();

        // Category indices are fixed by the whole table, independent of the date window
        let categories = match kind {
            ModelKind::Categorization => records
                .iter()
                .filter_map(|r| r.label.as_ref())
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            _ => Vec::new(),
        };

        info!(
            kind = %kind,
            rows = n_rows,
            features = mapping.features.len(),
            categories = categories.len(),
            "Loaded tabular records"
        );

        Ok(Self {
            kind,
            mapping,
            records,
            categories,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every row, regardless of date
    pub fn all_records(&self) -> &[TabularRecord] {
        &self.records
    }

    fn parse_label(&self, record: &TabularRecord) -> Result<f64> {
        let raw = record
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| LedgerMlError::DataError(format!("row {} has no label", record.row)))?;

        match self.kind {
            ModelKind::Categorization => self
                .categories
                .iter()
                .position(|c| c == raw)
                .map(|idx| idx as f64)
                .ok_or_else(|| LedgerMlError::DataError(format!("row {}: unknown category '{}'", record.row, raw))),
            _ => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LedgerMlError::DataError(format!("row {}: label '{}' is not numeric", record.row, raw))),
        }
    }
}

impl FeatureExtractor for TabularExtractor {
    type Record = TabularRecord;

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn feature_names(&self) -> Vec<String> {
        self.mapping.features.clone()
    }

    fn categories(&self) -> Vec<String> {
        self.categories.clone()
    }

    fn records(&self, range: &DateRange) -> Result<Vec<TabularRecord>> {
        let selected: Vec<TabularRecord> = self
            .records
            .iter()
            .filter(|r| r.date.map(|d| range.contains(d)).unwrap_or(false))
            .cloned()
            .collect();
        debug!(
            selected = selected.len(),
            total = self.records.len(),
            start = %range.start,
            end = %range.end,
            "Selected records in date range"
        );
        Ok(selected)
    }

    fn extract(&self, record: &TabularRecord) -> Result<LabeledSample> {
        let label = self.parse_label(record)?;
        let features: Vec<f64> = record
            .values
            .iter()
            .map(|v| v.filter(|x| x.is_finite()).unwrap_or(MISSING_FEATURE))
            .collect();

        Ok(match self.kind {
            ModelKind::Categorization => {
                LabeledSample::with_text(features, label, normalize(record.text.as_deref().unwrap_or("")))
            }
            _ => LabeledSample::new(features, label),
        })
    }
}

fn missing_column(name: &str) -> LedgerMlError {
    LedgerMlError::ConfigError(format!("column '{}' not found in table", name))
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name).map_err(|_| missing_column(name))?;
    let series = column.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name).map_err(|_| missing_column(name))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

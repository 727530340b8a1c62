use crate::vin::VinRecord;
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{ArrowError, DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::errors::ParquetError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Column names shared by every export format
const COLUMNS: [&str; 6] = ["vin", "make", "model", "model_year", "body_class", "photo_url"];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to build record batch: {0}")]
    Arrow(#[from] ArrowError),

    #[error("failed to write parquet: {0}")]
    Parquet(#[from] ParquetError),

    #[error("failed to flush export buffer: {0}")]
    Flush(String),
}

/// Requested download format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Parquet,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Parquet => "parquet",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Parquet => "application/vnd.apache.parquet",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// One exported row; column names follow the download file convention
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    vin: &'a str,
    make: &'a str,
    model: &'a str,
    model_year: &'a str,
    body_class: &'a str,
    photo_url: &'a str,
}

impl<'a> From<&'a VinRecord> for ExportRow<'a> {
    fn from(record: &'a VinRecord) -> Self {
        Self {
            vin: record.vin_number().as_str(),
            make: record.make(),
            model: record.model(),
            model_year: record.model_year(),
            body_class: record.body_class(),
            photo_url: record.photo_url().map(|url| url.as_str()).unwrap_or_default(),
        }
    }
}

/// Render `records` in the requested format
pub fn export_records(records: &[VinRecord], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Parquet => to_parquet(records),
    }
}

fn to_csv(records: &[VinRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    // Written explicitly so an empty export still carries the header row
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(ExportRow::from(record))?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Flush(e.to_string()))
}

/// Single row group, all columns UTF-8; `photo_url` is the only nullable one
fn to_parquet(records: &[VinRecord]) -> Result<Vec<u8>, ExportError> {
    let fields: Vec<Field> = COLUMNS
        .iter()
        .map(|name| Field::new(*name, DataType::Utf8, *name == "photo_url"))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let photo_urls: StringArray = records
        .iter()
        .map(|r| r.photo_url().map(Url::as_str))
        .collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            string_column(records.iter().map(|r| r.vin_number().as_str())),
            string_column(records.iter().map(|r| r.make())),
            string_column(records.iter().map(|r| r.model())),
            string_column(records.iter().map(|r| r.model_year())),
            string_column(records.iter().map(|r| r.body_class())),
            Arc::new(photo_urls) as ArrayRef,
        ],
    )?;

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(buffer)
}

fn string_column<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CovidgetterError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Workbook has no worksheets: {0}")]
    EmptyWorkbook(PathBuf),
    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("Required column not found: {0}")]
    MissingColumn(String),
    #[error("Invalid value in row {row}, column '{column}': {value}")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Invalid release URL template: {0}")]
    InvalidUrlTemplate(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped IO error: {0}")]
    IOError(#[from] std::io::Error),
}

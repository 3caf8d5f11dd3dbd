use std::path::PathBuf;

use covidgetter::error::CovidgetterError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum CovidgetterCliError {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("covidgetter error: {0}")]
    CovidgetterError(#[from] CovidgetterError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid TOML in config file: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("No release files found in {0}")]
    NoReleases(PathBuf),
    #[error("Invalid release selection: '{0}'")]
    InvalidSelection(String),
}

pub type CovidgetterCliResult<T> = Result<T, CovidgetterCliError>;

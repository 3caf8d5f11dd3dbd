//! The population reference: one population figure per location, used for per-million metrics
//! and for the locations export.

use std::path::Path;

use anyhow::Result;
use log::{debug, info};
use polars::prelude::*;

use crate::COL;

/// Reads a population CSV with `entity`, `year` and `population` columns. With `year` set only
/// that year's figures are kept, otherwise the latest year available per location is used.
pub fn load_population(path: &Path, year: Option<i64>) -> Result<DataFrame> {
    info!("Loading population from {}", path.display());
    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;
    let df = population_by_location(raw, year)?;
    debug!("Population available for {} locations", df.height());
    Ok(df)
}

/// Reduces a raw population table to `location, population, population_year`, one row per
/// location, sorted by location.
pub fn population_by_location(raw: DataFrame, year: Option<i64>) -> PolarsResult<DataFrame> {
    let lf = raw
        .lazy()
        .select([
            col(COL::POPULATION_ENTITY)
                .cast(DataType::String)
                .alias(COL::LOCATION),
            col(COL::POPULATION_ENTITY_YEAR)
                .cast(DataType::Int64)
                .alias(COL::POPULATION_YEAR),
            col(COL::POPULATION).cast(DataType::Float64),
        ])
        .filter(
            col(COL::LOCATION)
                .is_not_null()
                .and(col(COL::POPULATION).is_not_null()),
        );
    let lf = match year {
        Some(year) => lf.filter(col(COL::POPULATION_YEAR).eq(lit(year))),
        None => lf,
    };
    lf.sort(
        [COL::LOCATION, COL::POPULATION_YEAR],
        SortMultipleOptions::default().with_maintain_order(true),
    )
    .group_by_stable([col(COL::LOCATION)])
    .agg([
        col(COL::POPULATION).last(),
        col(COL::POPULATION_YEAR).last(),
    ])
    .collect()
}

/// Left-joins `population` and `population_year` onto `df` by location, rounded to whole
/// numbers. Locations without population data keep nulls.
pub fn inject_population(df: DataFrame, population: &DataFrame) -> PolarsResult<DataFrame> {
    df.lazy()
        .join(
            population.clone().lazy(),
            [col(COL::LOCATION)],
            [col(COL::LOCATION)],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([
            col(COL::POPULATION).round(0).cast(DataType::Int64),
            col(COL::POPULATION_YEAR).cast(DataType::Int64),
        ])
        .collect()
}

//! Writing the public CSV files: the locations reference and the standard dataset export.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use itertools::izip;
use log::info;
use polars::prelude::*;

use crate::{population::inject_population, release::epoch_days, COL};

pub const LOCATIONS_CSV: &str = "locations.csv";
pub const FULL_DATA_CSV: &str = "full_data.csv";

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).finish(df)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Writes `locations.csv`: the location mapping with whole-number `population` and
/// `population_year` columns, null where no population is known.
pub fn export_locations(
    locations: DataFrame,
    population: &DataFrame,
    output_path: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(output_path)?;
    let mut df = inject_population(locations, population)?;
    let path = output_path.join(LOCATIONS_CSV);
    write_csv(&mut df, &path)?;
    Ok(path)
}

/// One row per date and one column per location holding `metric`. `World` comes first, the
/// other locations follow in name order.
pub fn pivot_metric(df: &DataFrame, metric: &str) -> PolarsResult<DataFrame> {
    let dates = df.column(COL::DATE)?.cast(&DataType::Int32)?;
    let mut cells: BTreeMap<i32, BTreeMap<&str, Option<i64>>> = BTreeMap::new();
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for (date, location, value) in izip!(
        dates.i32()?,
        df.column(COL::LOCATION)?.str()?,
        df.column(metric)?.i64()?
    ) {
        if let (Some(date), Some(location)) = (date, location) {
            names.insert(location);
            cells.entry(date).or_default().insert(location, value);
        }
    }

    let mut ordered: Vec<&str> = names.iter().copied().filter(|n| *n != COL::WORLD).collect();
    if names.contains(COL::WORLD) {
        ordered.insert(0, COL::WORLD);
    }

    let days: Vec<i32> = cells.keys().copied().collect();
    let mut columns = vec![Series::new(COL::DATE, days).cast(&DataType::Date)?];
    for name in ordered {
        let values: Vec<Option<i64>> = cells
            .values()
            .map(|row| row.get(name).copied().flatten())
            .collect();
        columns.push(Series::new(name, values));
    }
    DataFrame::new(columns)
}

/// The grapher table: `Country`, `Year` as the number of days since `reference_date`, then every
/// metric column.
pub fn grapher_frame(df: &DataFrame, reference_date: NaiveDate) -> PolarsResult<DataFrame> {
    df.clone()
        .lazy()
        .select([
            col(COL::LOCATION).alias(COL::GRAPHER_COUNTRY),
            (col(COL::DATE).cast(DataType::Int32) - lit(epoch_days(reference_date)))
                .cast(DataType::Int64)
                .alias(COL::GRAPHER_YEAR),
            col("*").exclude([COL::DATE, COL::LOCATION]),
        ])
        .collect()
}

/// Writes the standardized dataset to `output_path`:
/// - `full_data.csv` with the daily and total counts
/// - one pivoted file per count metric, e.g. `total_cases.csv`
/// - `<dataset_name>.csv` for the grapher
pub fn standard_export(
    df: &DataFrame,
    output_path: &Path,
    dataset_name: &str,
    reference_date: NaiveDate,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_path)?;
    let mut written = vec![];

    let mut full_data = df.select([
        COL::DATE,
        COL::LOCATION,
        COL::NEW_CASES,
        COL::NEW_DEATHS,
        COL::TOTAL_CASES,
        COL::TOTAL_DEATHS,
    ])?;
    let path = output_path.join(FULL_DATA_CSV);
    write_csv(&mut full_data, &path)?;
    written.push(path);

    for metric in COL::COUNT_METRICS {
        let mut pivot = pivot_metric(df, metric)?;
        let path = output_path.join(format!("{metric}.csv"));
        write_csv(&mut pivot, &path)?;
        written.push(path);
    }

    let mut grapher = grapher_frame(df, reference_date)?;
    let path = output_path.join(format!("{dataset_name}.csv"));
    write_csv(&mut grapher, &path)?;
    written.push(path);

    Ok(written)
}

//! Merging a release with the location mapping, and the correctness checks that gate the export.

use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};
use polars::prelude::*;

use crate::COL;

/// Left-joins the release onto the location mapping by raw country label. Rows whose label has
/// no mapping keep a null `location`.
pub fn merge_locations(release: DataFrame, locations: &DataFrame) -> PolarsResult<DataFrame> {
    release
        .lazy()
        .join(
            locations.clone().lazy(),
            [col(COL::COUNTRIES_AND_TERRITORIES)],
            [col(COL::COUNTRIES_AND_TERRITORIES)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()
}

/// Distinct `(Countries and territories, GeoId, location)` triples of a merged release.
pub fn distinct_labels(merged: &DataFrame) -> PolarsResult<DataFrame> {
    merged
        .clone()
        .lazy()
        .select([
            col(COL::COUNTRIES_AND_TERRITORIES),
            col(COL::GEO_ID),
            col(COL::LOCATION),
        ])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()
}

/// Triples whose raw label did not map to a canonical location.
pub fn unmapped_locations(distinct: &DataFrame) -> PolarsResult<DataFrame> {
    distinct
        .clone()
        .lazy()
        .filter(col(COL::LOCATION).is_null())
        .collect()
}

/// Every mapped row that shares its `(DateRep, location)` pair with another row.
pub fn duplicate_rows(merged: &DataFrame) -> PolarsResult<DataFrame> {
    merged
        .clone()
        .lazy()
        .filter(col(COL::LOCATION).is_not_null())
        .filter(
            col(COL::LOCATION)
                .count()
                .over([col(COL::DATE_REP), col(COL::LOCATION)])
                .gt(lit(1)),
        )
        .collect()
}

/// Canonical locations of the release that have no population figure, sorted.
pub fn missing_population(
    distinct: &DataFrame,
    population: &DataFrame,
) -> PolarsResult<Vec<String>> {
    let known: HashSet<&str> = population
        .column(COL::LOCATION)?
        .str()?
        .into_iter()
        .flatten()
        .collect();
    Ok(distinct
        .column(COL::LOCATION)?
        .str()?
        .into_iter()
        .flatten()
        .filter(|location| !known.contains(location))
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect())
}

/// Writes every raw label of the release under a `Country` header, ready to be run through the
/// standardizer and saved as the new location mapping.
pub fn write_scratch_csv(distinct: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut df = distinct
        .clone()
        .lazy()
        .select([col(COL::COUNTRIES_AND_TERRITORIES).alias(COL::MAPPING_COUNTRY)])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    Ok(())
}

/// The outcome of the correctness checks. Unmapped locations and duplicate rows are errors;
/// locations missing from the population reference are only a warning.
#[derive(Debug)]
pub struct ValidationReport {
    pub unmapped: DataFrame,
    pub duplicates: DataFrame,
    pub missing_population: Vec<String>,
    /// Set when unmapped locations were found and the scratch file was written.
    pub scratch_csv: Option<PathBuf>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        usize::from(self.unmapped.height() > 0) + usize::from(self.duplicates.height() > 0)
    }

    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }
}

/// Runs all checks over a merged release. When some labels are unmapped, the scratch file is
/// written to `scratch_csv`.
pub fn validate(
    merged: &DataFrame,
    population: &DataFrame,
    scratch_csv: &Path,
) -> Result<ValidationReport> {
    let distinct = distinct_labels(merged)?;
    let unmapped = unmapped_locations(&distinct)?;
    let scratch_csv = if unmapped.height() > 0 {
        warn!("{} labels could not be mapped", unmapped.height());
        write_scratch_csv(&distinct, scratch_csv)?;
        Some(scratch_csv.to_path_buf())
    } else {
        None
    };
    let duplicates = duplicate_rows(merged)?;
    let missing_population = missing_population(&distinct, population)?;
    debug!(
        "unmapped: {}, duplicates: {}, missing population: {}",
        unmapped.height(),
        duplicates.height(),
        missing_population.len()
    );
    Ok(ValidationReport {
        unmapped,
        duplicates,
        missing_population,
        scratch_csv,
    })
}

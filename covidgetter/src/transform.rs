//! The steps turning a merged release into the standardized dataset. Each step is a
//! `Transform` over a polars `DataFrame`; `standardize` runs them in order.

use enum_dispatch::enum_dispatch;
use log::debug;
use polars::error::PolarsResult;
use polars::prelude::*;

use crate::{config::DaysSinceThreshold, COL};

#[enum_dispatch]
pub trait Transform {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame>;
}

#[enum_dispatch(Transform)]
#[derive(Debug, Clone)]
pub enum StandardizeStep {
    StandardColumns(StandardColumns),
    InjectWorld(InjectWorld),
    InjectTotals(InjectTotals),
    InjectPerMillion(InjectPerMillion),
    InjectDaysSince(InjectDaysSince),
    InjectCfr(InjectCfr),
    SortByLocationDate(SortByLocationDate),
}

fn location_date_order() -> SortMultipleOptions {
    SortMultipleOptions::default().with_maintain_order(true)
}

/// Renames the release columns to the standard schema and keeps only
/// `date, location, new_cases, new_deaths`. Unmapped rows are dropped.
#[derive(Debug, Clone, Default)]
pub struct StandardColumns;

impl Transform for StandardColumns {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        df.lazy()
            .filter(col(COL::LOCATION).is_not_null())
            .select([
                col(COL::DATE_REP).alias(COL::DATE),
                col(COL::LOCATION),
                col(COL::CASES).alias(COL::NEW_CASES),
                col(COL::DEATHS).alias(COL::NEW_DEATHS),
            ])
            .collect()
    }
}

/// Adds a `World` location holding, for each date, the sum of the daily metrics of every other
/// location.
#[derive(Debug, Clone, Default)]
pub struct InjectWorld;

impl Transform for InjectWorld {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let locations = df.lazy().filter(col(COL::LOCATION).neq(lit(COL::WORLD)));
        let world = locations
            .clone()
            .group_by_stable([col(COL::DATE)])
            .agg([col(COL::NEW_CASES).sum(), col(COL::NEW_DEATHS).sum()])
            .select([
                col(COL::DATE),
                lit(COL::WORLD).alias(COL::LOCATION),
                col(COL::NEW_CASES),
                col(COL::NEW_DEATHS),
            ]);
        concat([locations, world], UnionArgs::default())?.collect()
    }
}

/// Adds `total_<metric>` as the running sum of `new_<metric>` per location in date order.
/// Missing daily values count as zero.
#[derive(Debug, Clone)]
pub struct InjectTotals {
    pub metrics: Vec<String>,
}

impl Transform for InjectTotals {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let totals: Vec<Expr> = self
            .metrics
            .iter()
            .map(|metric| {
                col(&format!("new_{metric}"))
                    .fill_null(lit(0))
                    .cum_sum(false)
                    .over([col(COL::LOCATION)])
                    .alias(&format!("total_{metric}"))
            })
            .collect();
        df.lazy()
            .sort([COL::LOCATION, COL::DATE], location_date_order())
            .with_columns(totals)
            .collect()
    }
}

/// Adds `<column>_per_million` for each column, using the population reference. Locations
/// without a population get nulls.
#[derive(Debug, Clone)]
pub struct InjectPerMillion {
    pub population: DataFrame,
    pub columns: Vec<String>,
}

impl Transform for InjectPerMillion {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let per_million: Vec<Expr> = self
            .columns
            .iter()
            .map(|column| {
                (col(column).cast(DataType::Float64) / (col(COL::POPULATION) / lit(1e6)))
                    .alias(&COL::per_million(column))
            })
            .collect();
        df.lazy()
            .join(
                self.population
                    .clone()
                    .lazy()
                    .select([col(COL::LOCATION), col(COL::POPULATION)]),
                [col(COL::LOCATION)],
                [col(COL::LOCATION)],
                JoinArgs::new(JoinType::Left),
            )
            .with_columns(per_million)
            .select([col("*").exclude([COL::POPULATION])])
            .collect()
    }
}

/// Adds one column per threshold holding the number of days since the location first reached
/// it. Null before that day, and for locations that never reach it.
#[derive(Debug, Clone)]
pub struct InjectDaysSince {
    pub thresholds: Vec<DaysSinceThreshold>,
}

impl Transform for InjectDaysSince {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        let days_since: Vec<Expr> = self
            .thresholds
            .iter()
            .map(|threshold| {
                let first_date = col(COL::DATE)
                    .filter(col(&threshold.column).gt_eq(lit(threshold.threshold)))
                    .min()
                    .over([col(COL::LOCATION)]);
                let days = (col(COL::DATE).cast(DataType::Int32)
                    - first_date.cast(DataType::Int32))
                .cast(DataType::Int64);
                when(days.clone().gt_eq(lit(0)))
                    .then(days)
                    .otherwise(lit(NULL).cast(DataType::Int64))
                    .alias(&threshold.column_name())
            })
            .collect();
        df.lazy().with_columns(days_since).collect()
    }
}

/// Adds `cfr = total_deaths / total_cases`, null while there are no cases.
#[derive(Debug, Clone, Default)]
pub struct InjectCfr;

impl Transform for InjectCfr {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        df.lazy()
            .with_column(
                when(col(COL::TOTAL_CASES).gt(lit(0)))
                    .then(
                        col(COL::TOTAL_DEATHS).cast(DataType::Float64)
                            / col(COL::TOTAL_CASES).cast(DataType::Float64),
                    )
                    .otherwise(lit(NULL).cast(DataType::Float64))
                    .alias(COL::CFR),
            )
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SortByLocationDate;

impl Transform for SortByLocationDate {
    fn transform(&self, df: DataFrame) -> PolarsResult<DataFrame> {
        df.sort([COL::LOCATION, COL::DATE], location_date_order())
    }
}

/// The ordered steps producing the standardized dataset.
pub fn standard_steps(
    population: &DataFrame,
    thresholds: &[DaysSinceThreshold],
) -> Vec<StandardizeStep> {
    vec![
        StandardColumns.into(),
        InjectWorld.into(),
        InjectTotals {
            metrics: vec!["cases".into(), "deaths".into()],
        }
        .into(),
        InjectPerMillion {
            population: population.clone(),
            columns: COL::COUNT_METRICS.iter().map(|c| c.to_string()).collect(),
        }
        .into(),
        InjectDaysSince {
            thresholds: thresholds.to_vec(),
        }
        .into(),
        InjectCfr.into(),
        SortByLocationDate.into(),
    ]
}

/// Turns a merged release into the standardized dataset.
pub fn standardize(
    merged: DataFrame,
    population: &DataFrame,
    thresholds: &[DaysSinceThreshold],
) -> PolarsResult<DataFrame> {
    let df = standard_steps(population, thresholds)
        .iter()
        .try_fold(merged, |df, step| step.transform(df))?;
    debug!("Standardized dataset shape: {:?}", df.shape());
    Ok(df)
}

//! Loading of the release spreadsheets and of the location mapping table.

use std::path::Path;

use anyhow::Result;
use calamine::{open_workbook_auto, Data, DataType as _, Range, Reader};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use log::{debug, info};
use polars::prelude::*;

use crate::{error::CovidgetterError, fetch::RELEASE_EXTENSIONS, COL};

static EMPTY_CELL: Data = Data::Empty;

/// One row of a release: the counts reported for a country on a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseRecord {
    pub date: NaiveDate,
    pub country: String,
    pub geo_id: String,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
}

/// Number of days since the unix epoch, the physical representation of a polars `Date`.
pub fn epoch_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

pub fn date_series(name: &str, dates: &[NaiveDate]) -> PolarsResult<Series> {
    let days: Vec<i32> = dates.iter().copied().map(epoch_days).collect();
    Series::new(name, days).cast(&DataType::Date)
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_date_str(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%Y-%m-%d", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn cell_to_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::Float(serial) => excel_serial_to_date(*serial),
        Data::Int(serial) => excel_serial_to_date(*serial as f64),
        Data::String(value) => parse_date_str(value),
        other => other.as_date(),
    }
}

/// Text cells are taken verbatim; in particular Namibia's code "NA" is not a missing value.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// `None` if the cell does not hold a whole number; `Some(None)` if it is blank.
fn cell_to_count(cell: &Data) -> Option<Option<i64>> {
    match cell {
        Data::Empty => Some(None),
        Data::Int(value) => Some(Some(*value)),
        Data::Float(value) if value.fract() == 0.0 => Some(Some(*value as i64)),
        Data::String(value) if value.trim().is_empty() => Some(None),
        Data::String(value) => value.trim().parse::<i64>().ok().map(Some),
        _ => None,
    }
}

fn invalid_cell(row: usize, column: &str, cell: &Data) -> CovidgetterError {
    CovidgetterError::InvalidCell {
        row,
        column: column.to_string(),
        value: cell_to_string(cell),
    }
}

/// Parses the rows of a release worksheet. The first row holds the headers, which are matched
/// case-insensitively against each of `names`; fully blank rows are skipped.
pub fn parse_release(range: &Range<Data>) -> Result<Vec<ReleaseRecord>> {
    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .map(|row| row.iter().map(|cell| cell_to_string(cell).trim().to_string()).collect())
        .unwrap_or_default();
    let index = |names: &[&str]| {
        header
            .iter()
            .position(|h| names.iter().any(|name| h.eq_ignore_ascii_case(name)))
            .ok_or_else(|| CovidgetterError::MissingColumn(names[0].to_string()))
    };
    let date_idx = index(&[COL::DATE_REP])?;
    let cases_idx = index(&[COL::CASES])?;
    let deaths_idx = index(&[COL::DEATHS])?;
    let country_idx = index(&[
        COL::COUNTRIES_AND_TERRITORIES,
        COL::COUNTRIES_AND_TERRITORIES_CAMEL,
    ])?;
    let geo_id_idx = index(&[COL::GEO_ID])?;

    let mut records = vec![];
    for (offset, row) in rows.enumerate() {
        // Spreadsheet row number, header being row 1
        let row_number = offset + 2;
        if row.iter().all(|cell| matches!(cell, Data::Empty)) {
            continue;
        }
        let cell = |idx: usize| row.get(idx).unwrap_or(&EMPTY_CELL);
        let date = cell_to_date(cell(date_idx))
            .ok_or_else(|| invalid_cell(row_number, COL::DATE_REP, cell(date_idx)))?;
        let cases = cell_to_count(cell(cases_idx))
            .ok_or_else(|| invalid_cell(row_number, COL::CASES, cell(cases_idx)))?;
        let deaths = cell_to_count(cell(deaths_idx))
            .ok_or_else(|| invalid_cell(row_number, COL::DEATHS, cell(deaths_idx)))?;
        records.push(ReleaseRecord {
            date,
            country: cell_to_string(cell(country_idx)).trim().to_string(),
            geo_id: cell_to_string(cell(geo_id_idx)).trim().to_string(),
            cases,
            deaths,
        });
    }
    Ok(records)
}

/// Builds the release `DataFrame`, including the date-part columns of the published schema.
pub fn records_to_frame(records: &[ReleaseRecord]) -> PolarsResult<DataFrame> {
    let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
    DataFrame::new(vec![
        date_series(COL::DATE_REP, &dates)?,
        Series::new(
            COL::DAY,
            dates.iter().map(|d| d.day() as i64).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MONTH,
            dates.iter().map(|d| d.month() as i64).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::YEAR,
            dates.iter().map(|d| d.year() as i64).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::CASES,
            records.iter().map(|r| r.cases).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::DEATHS,
            records.iter().map(|r| r.deaths).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::COUNTRIES_AND_TERRITORIES,
            records.iter().map(|r| r.country.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::GEO_ID,
            records.iter().map(|r| r.geo_id.as_str()).collect::<Vec<_>>(),
        ),
    ])
}

/// Reads the first worksheet of a release file (`.xlsx` or `.xls`).
pub fn load_release(path: &Path) -> Result<DataFrame> {
    info!("Loading release from {}", path.display());
    let mut workbook = open_workbook_auto(path).map_err(CovidgetterError::from)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| CovidgetterError::EmptyWorkbook(path.to_path_buf()))?
        .map_err(CovidgetterError::from)?;
    let records = parse_release(&range)?;
    debug!("Parsed {} release rows", records.len());
    Ok(records_to_frame(&records)?)
}

/// Reads the location mapping table, with every column as a string, and renames its columns to
/// line up with the release.
pub fn load_locations(path: &Path) -> Result<DataFrame> {
    info!("Loading location mapping from {}", path.display());
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;
    df.rename(COL::MAPPING_COUNTRY, COL::COUNTRIES_AND_TERRITORIES)?;
    df.rename(COL::MAPPING_OWID_NAME, COL::LOCATION)?;
    Ok(df)
}

/// File names of the candidate releases in `releases_path`, newest first.
pub fn release_files(releases_path: &Path) -> Result<Vec<String>> {
    let mut names = vec![];
    for ext in RELEASE_EXTENSIONS {
        let pattern = releases_path.join(format!("*.{ext}"));
        for entry in glob::glob(&pattern.to_string_lossy())? {
            if let Some(name) = entry?.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort_unstable_by(|a, b| b.cmp(a));
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sheet(rows: &[Vec<Data>]) -> Range<Data> {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(1) as u32;
        let mut range = Range::new((0, 0), (rows.len() as u32 - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn s(value: &str) -> Data {
        Data::String(value.to_string())
    }

    fn header() -> Vec<Data> {
        ["DateRep", "Day", "Month", "Year", "Cases", "Deaths"]
            .into_iter()
            .chain(["Countries and territories", "GeoId"])
            .map(s)
            .collect()
    }

    #[test]
    fn parse_release_reads_rows_and_keeps_namibia_code() {
        let range = sheet(&[
            header(),
            vec![
                Data::Float(43891.0),
                Data::Float(1.0),
                Data::Float(3.0),
                Data::Float(2020.0),
                Data::Float(10.0),
                Data::Float(0.0),
                s("Germany"),
                s("DE"),
            ],
            vec![
                s("2020-03-14"),
                Data::Float(14.0),
                Data::Float(3.0),
                Data::Float(2020.0),
                Data::Int(2),
                Data::Empty,
                s("Namibia"),
                s("NA"),
            ],
            vec![Data::Empty; 8],
        ]);
        let records = parse_release(&range).unwrap();
        assert_eq!(
            records,
            vec![
                ReleaseRecord {
                    date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
                    country: "Germany".into(),
                    geo_id: "DE".into(),
                    cases: Some(10),
                    deaths: Some(0),
                },
                ReleaseRecord {
                    date: NaiveDate::from_ymd_opt(2020, 3, 14).unwrap(),
                    country: "Namibia".into(),
                    geo_id: "NA".into(),
                    cases: Some(2),
                    deaths: None,
                },
            ]
        );
    }

    #[test]
    fn parse_release_accepts_camel_cased_headers() {
        let camel: Vec<Data> = [
            "dateRep",
            "day",
            "month",
            "year",
            "cases",
            "deaths",
            "countriesAndTerritories",
            "geoId",
        ]
        .into_iter()
        .map(s)
        .collect();
        let range = sheet(&[
            camel,
            vec![
                s("01/03/2020"),
                Data::Float(1.0),
                Data::Float(3.0),
                Data::Float(2020.0),
                s("7"),
                Data::Float(1.0),
                s("Italy"),
                s("IT"),
            ],
        ]);
        let records = parse_release(&range).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2020, 3, 1).unwrap());
        assert_eq!(records[0].country, "Italy");
        assert_eq!(records[0].cases, Some(7));
    }

    #[test]
    fn parse_release_reports_missing_columns_and_bad_cells() {
        let range = sheet(&[vec![s("DateRep"), s("Cases")]]);
        let err = parse_release(&range).unwrap_err();
        assert!(err.to_string().contains("Deaths"));

        let range = sheet(&[
            header(),
            vec![
                s("2020-03-01"),
                Data::Float(1.0),
                Data::Float(3.0),
                Data::Float(2020.0),
                s("many"),
                Data::Float(0.0),
                s("Germany"),
                s("DE"),
            ],
        ]);
        let err = parse_release(&range).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value in row 2, column 'Cases': many"
        );
    }

    #[test]
    fn records_to_frame_has_release_schema() {
        let df = records_to_frame(&[ReleaseRecord {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            country: "Germany".into(),
            geo_id: "DE".into(),
            cases: Some(5),
            deaths: Some(1),
        }])
        .unwrap();
        assert_eq!(
            df.get_column_names(),
            &[
                "DateRep",
                "Day",
                "Month",
                "Year",
                "Cases",
                "Deaths",
                "Countries and territories",
                "GeoId"
            ]
        );
        assert_eq!(df.column(COL::DATE_REP).unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column(COL::DAY).unwrap().i64().unwrap().get(0), Some(2));
    }

    #[test]
    fn load_locations_renames_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.csv");
        fs::write(
            &path,
            "Country,Our World In Data Name\nGermany,Germany\n\"Cases on an international conveyance Japan\",International\nNamibia,Namibia\n",
        )
        .unwrap();
        let df = load_locations(&path).unwrap();
        assert_eq!(
            df.get_column_names(),
            &["Countries and territories", "location"]
        );
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn release_files_are_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "2020-03-19.xlsx",
            "2020-03-20.xls",
            "2020-03-20-modified.xlsx",
            "notes.md",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            release_files(dir.path()).unwrap(),
            vec!["2020-03-20.xls", "2020-03-20-modified.xlsx", "2020-03-19.xlsx"]
        );
    }
}

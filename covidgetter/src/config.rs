use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::COL;

/// A "days since" column: the number of days since `column` first reached `threshold` for a
/// location.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DaysSinceThreshold {
    pub column: String,
    pub threshold: f64,
}

impl DaysSinceThreshold {
    pub fn new(column: &str, threshold: f64) -> Self {
        Self {
            column: column.into(),
            threshold,
        }
    }

    /// Output column name, e.g. `days_since_0_1_total_deaths_per_million`
    pub fn column_name(&self) -> String {
        let threshold = self.threshold.to_string().replace('.', "_");
        format!("days_since_{threshold}_{}", self.column)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub tmp_path: PathBuf,
    pub releases_path: PathBuf,
    pub locations_csv_path: PathBuf,
    pub population_csv_path: PathBuf,
    /// Population year used for per-million metrics. When unset, the latest year available for
    /// each location is used.
    pub population_year: Option<i64>,
    /// `{date}` and `{ext}` are substituted for each candidate release file.
    pub release_url_template: String,
    pub dataset_name: String,
    pub grapher_reference_date: NaiveDate,
    pub days_since: Vec<DaysSinceThreshold>,
}

impl Config {
    /// Scratch file written for manual remapping when some locations are not mapped
    pub fn scratch_csv_path(&self) -> PathBuf {
        self.tmp_path.join("ecdc.csv")
    }

    pub fn release_path(&self, file_name: &str) -> PathBuf {
        self.releases_path.join(file_name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let input_path = PathBuf::from("input/ecdc");
        Config {
            output_path: "public/data/ecdc".into(),
            tmp_path: "tmp".into(),
            releases_path: input_path.join("releases"),
            locations_csv_path: input_path.join("ecdc_country_standardized.csv"),
            population_csv_path: "input/un/population_2020.csv".into(),
            input_path,
            population_year: Some(2020),
            release_url_template: "https://www.ecdc.europa.eu/sites/default/files/documents/COVID-19-geographic-disbtribution-worldwide-{date}.{ext}".into(),
            dataset_name: "COVID-2019 - ECDC (2020)".into(),
            grapher_reference_date: NaiveDate::from_ymd_opt(2020, 1, 21).unwrap_or_default(),
            days_since: vec![
                DaysSinceThreshold::new(COL::TOTAL_CASES, 100.0),
                DaysSinceThreshold::new(COL::TOTAL_DEATHS, 5.0),
                DaysSinceThreshold::new(&COL::per_million(COL::TOTAL_CASES), 1.0),
                DaysSinceThreshold::new(&COL::per_million(COL::TOTAL_DEATHS), 0.1),
            ],
        }
    }
}

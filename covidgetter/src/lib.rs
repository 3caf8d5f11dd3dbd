use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use log::{debug, info};
use polars::frame::DataFrame;

use crate::config::Config;
use crate::fetch::FetchOutcome;
use crate::validate::ValidationReport;

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod population;
pub mod release;
pub mod transform;
pub mod validate;

/// The ECDC pipeline bound to a configuration. Release files are referred to by their file name
/// within the configured releases directory.
pub struct Covidgetter {
    pub config: Config,
}

impl Covidgetter {
    /// Setup the Covidgetter object with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the Covidgetter object with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Attempts to download the releases of the last `last_n` days. Failures are reported in the
    /// outcomes only.
    pub async fn download(&self, last_n: usize) -> Result<Vec<FetchOutcome>> {
        fetch::download_releases(
            &reqwest::Client::new(),
            &self.config.release_url_template,
            &self.config.releases_path,
            Utc::now().date_naive(),
            last_n,
        )
        .await
    }

    /// Candidate release files, newest first
    pub fn release_files(&self) -> Result<Vec<String>> {
        release::release_files(&self.config.releases_path)
    }

    pub fn load_release(&self, file_name: &str) -> Result<DataFrame> {
        release::load_release(&self.config.release_path(file_name))
    }

    pub fn load_locations(&self) -> Result<DataFrame> {
        release::load_locations(&self.config.locations_csv_path)
    }

    pub fn load_population(&self) -> Result<DataFrame> {
        population::load_population(
            &self.config.population_csv_path,
            self.config.population_year,
        )
    }

    /// The release left-joined onto the location mapping
    pub fn merge(&self, file_name: &str) -> Result<DataFrame> {
        let release = self.load_release(file_name)?;
        let locations = self.load_locations()?;
        Ok(validate::merge_locations(release, &locations)?)
    }

    /// Runs the correctness checks that gate the export
    pub fn validate(&self, file_name: &str) -> Result<ValidationReport> {
        let merged = self.merge(file_name)?;
        let population = self.load_population()?;
        validate::validate(&merged, &population, &self.config.scratch_csv_path())
    }

    /// The standardized dataset for a release
    pub fn standardize(&self, file_name: &str) -> Result<DataFrame> {
        let merged = self.merge(file_name)?;
        let population = self.load_population()?;
        Ok(transform::standardize(
            merged,
            &population,
            &self.config.days_since,
        )?)
    }

    /// Writes `locations.csv` and the standard export. Returns every file written.
    pub fn export(&self, file_name: &str) -> Result<Vec<PathBuf>> {
        let population = self.load_population()?;
        let mut written = vec![export::export_locations(
            self.load_locations()?,
            &population,
            &self.config.output_path,
        )?];
        let df = self.standardize(file_name)?;
        written.extend(export::standard_export(
            &df,
            &self.config.output_path,
            &self.config.dataset_name,
            self.config.grapher_reference_date,
        )?);
        info!("Exported {} files", written.len());
        Ok(written)
    }
}

impl Default for Covidgetter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::DataType;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
    use std::fs;
    use std::path::Path;

    const HEADER: [&str; 8] = [
        "DateRep",
        "Day",
        "Month",
        "Year",
        "Cases",
        "Deaths",
        "Countries and territories",
        "GeoId",
    ];

    /// Writes a release workbook with real Excel date cells.
    fn write_release(path: &Path, rows: &[(u8, u32, u32, &str, &str)]) {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("dd/mm/yyyy");
        let worksheet = workbook.add_worksheet();
        for (col, name) in HEADER.iter().enumerate() {
            worksheet.write_string(0, col as u16, *name).unwrap();
        }
        for (idx, (day, cases, deaths, country, geo_id)) in rows.iter().enumerate() {
            let row = idx as u32 + 1;
            let date = ExcelDateTime::from_ymd(2020, 3, *day).unwrap();
            worksheet
                .write_datetime_with_format(row, 0, &date, &date_format)
                .unwrap();
            worksheet.write_number(row, 1, *day).unwrap();
            worksheet.write_number(row, 2, 3).unwrap();
            worksheet.write_number(row, 3, 2020).unwrap();
            worksheet.write_number(row, 4, *cases).unwrap();
            worksheet.write_number(row, 5, *deaths).unwrap();
            worksheet.write_string(row, 6, *country).unwrap();
            worksheet.write_string(row, 7, *geo_id).unwrap();
        }
        workbook.save(path).unwrap();
    }

    fn setup(dir: &Path, mapping: &str) -> Covidgetter {
        let config = Config {
            input_path: dir.join("input"),
            output_path: dir.join("output"),
            tmp_path: dir.join("tmp"),
            releases_path: dir.join("releases"),
            locations_csv_path: dir.join("mapping.csv"),
            population_csv_path: dir.join("population.csv"),
            ..Config::default()
        };
        fs::create_dir_all(&config.releases_path).unwrap();
        fs::write(&config.locations_csv_path, mapping).unwrap();
        fs::write(
            &config.population_csv_path,
            "entity,year,population\nGermany,2019,83517045.0\nGermany,2020,83783942.0\nNamibia,2020,2540916.0\n",
        )
        .unwrap();
        Covidgetter::new_with_config(config)
    }

    const MAPPING: &str = "Country,Our World In Data Name\nGermany,Germany\nNamibia,Namibia\n";

    #[test]
    fn release_workbook_validates_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let covidgetter = setup(dir.path(), MAPPING);
        write_release(
            &covidgetter.config.release_path("2020-03-02.xlsx"),
            &[
                (2, 5, 1, "Germany", "DE"),
                (1, 10, 0, "Germany", "DE"),
                (2, 0, 0, "Namibia", "NA"),
                (1, 2, 0, "Namibia", "NA"),
            ],
        );

        let release = covidgetter.load_release("2020-03-02.xlsx").unwrap();
        assert_eq!(release.height(), 4);
        let dates: Vec<Option<String>> = release
            .column(COL::DATE_REP)
            .unwrap()
            .cast(&DataType::String)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|d| d.map(str::to_string))
            .collect();
        assert_eq!(
            dates,
            ["2020-03-02", "2020-03-01", "2020-03-02", "2020-03-01"]
                .map(|d| Some(d.to_string()))
        );
        let geo_ids: Vec<Option<&str>> = release
            .column(COL::GEO_ID)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(geo_ids, vec![Some("DE"), Some("DE"), Some("NA"), Some("NA")]);

        let report = covidgetter.validate("2020-03-02.xlsx").unwrap();
        assert!(report.passed());
        assert!(report.missing_population.is_empty());

        let written = covidgetter.export("2020-03-02.xlsx").unwrap();
        let output = &covidgetter.config.output_path;
        assert!(written.contains(&output.join(export::LOCATIONS_CSV)));
        assert!(written.contains(&output.join(export::FULL_DATA_CSV)));

        let full_data = fs::read_to_string(output.join(export::FULL_DATA_CSV)).unwrap();
        assert!(full_data.contains("2020-03-01,Namibia,2,0,2,0\n"));
        assert!(full_data.contains("2020-03-01,World,12,0,12,0\n"));
        assert!(full_data.contains("2020-03-02,World,5,1,17,1\n"));

        assert_eq!(
            fs::read_to_string(output.join(export::LOCATIONS_CSV)).unwrap(),
            "Countries and territories,location,population,population_year\nGermany,Germany,83783942,2020\nNamibia,Namibia,2540916,2020\n"
        );
    }

    #[test]
    fn blank_mapping_name_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let covidgetter = setup(
            dir.path(),
            "Country,Our World In Data Name\nGermany,Germany\nCongo,\n",
        );
        write_release(
            &covidgetter.config.release_path("2020-03-01.xlsx"),
            &[(1, 10, 0, "Germany", "DE"), (1, 1, 0, "Congo", "CG")],
        );

        let report = covidgetter.validate("2020-03-01.xlsx").unwrap();
        assert!(!report.passed());
        let unmapped: Vec<Option<&str>> = report
            .unmapped
            .column(COL::COUNTRIES_AND_TERRITORIES)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(unmapped, vec![Some("Congo")]);
        assert!(covidgetter.config.scratch_csv_path().exists());
    }

    #[test]
    fn empty_release_validates_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let covidgetter = setup(dir.path(), MAPPING);
        write_release(&covidgetter.config.release_path("2020-03-01.xlsx"), &[]);

        assert_eq!(covidgetter.load_release("2020-03-01.xlsx").unwrap().height(), 0);
        assert!(covidgetter.validate("2020-03-01.xlsx").unwrap().passed());
        assert_eq!(covidgetter.standardize("2020-03-01.xlsx").unwrap().height(), 0);
        covidgetter.export("2020-03-01.xlsx").unwrap();
        assert!(covidgetter
            .config
            .output_path
            .join(export::FULL_DATA_CSV)
            .exists());
    }

    #[test]
    fn population_is_read_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let covidgetter = setup(dir.path(), MAPPING);
        let population = covidgetter.load_population().unwrap();
        assert_eq!(population.height(), 2);
        let values: Vec<Option<f64>> = population
            .column(COL::POPULATION)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(values, vec![Some(83_783_942.0), Some(2_540_916.0)]);
    }
}

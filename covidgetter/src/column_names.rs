//! This module stores the column names used throughout the pipeline: the headers of the ECDC
//! release spreadsheet, the columns of the reference tables, and the columns of the standardized
//! output. Note that the release headers must be kept in sync with the published spreadsheet!

// Release spreadsheet
pub const DATE_REP: &str = "DateRep";
pub const DAY: &str = "Day";
pub const MONTH: &str = "Month";
pub const YEAR: &str = "Year";
pub const CASES: &str = "Cases";
pub const DEATHS: &str = "Deaths";
pub const COUNTRIES_AND_TERRITORIES: &str = "Countries and territories";
/// Header used for the country column by the releases with camel-cased headers
pub const COUNTRIES_AND_TERRITORIES_CAMEL: &str = "countriesAndTerritories";
pub const GEO_ID: &str = "GeoId";

// Location mapping CSV, as found on disk
pub const MAPPING_COUNTRY: &str = "Country";
pub const MAPPING_OWID_NAME: &str = "Our World In Data Name";

// Population CSV, as found on disk
pub const POPULATION_ENTITY: &str = "entity";
pub const POPULATION_ENTITY_YEAR: &str = "year";

// Standardized dataset
pub const DATE: &str = "date";
pub const LOCATION: &str = "location";
pub const POPULATION: &str = "population";
pub const POPULATION_YEAR: &str = "population_year";
pub const NEW_CASES: &str = "new_cases";
pub const NEW_DEATHS: &str = "new_deaths";
pub const TOTAL_CASES: &str = "total_cases";
pub const TOTAL_DEATHS: &str = "total_deaths";
pub const CFR: &str = "cfr";

// Grapher export
pub const GRAPHER_COUNTRY: &str = "Country";
pub const GRAPHER_YEAR: &str = "Year";

/// Name of the synthetic aggregate location.
pub const WORLD: &str = "World";

/// The four count columns that get per-million variants and per-metric exports.
pub const COUNT_METRICS: [&str; 4] = [NEW_CASES, NEW_DEATHS, TOTAL_CASES, TOTAL_DEATHS];

pub fn per_million(column: &str) -> String {
    format!("{column}_per_million")
}

use std::path::Path;

use comfy_table::{presets::NOTHING, *};
use console::style;
use covidgetter::{config::Config, validate::ValidationReport};
use polars::prelude::{AnyValue, DataFrame};

const ERROR: &str = "[Error]";
const WARNING: &str = "[Warning]";

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn format_value(value: AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

/// Renders every column and row of a dataframe as a table.
pub fn frame_table(df: &DataFrame) -> anyhow::Result<Table> {
    let mut table = new_table();
    table.set_header(
        df.get_column_names()
            .into_iter()
            .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
    );
    let columns = df.get_columns();
    for idx in 0..df.height() {
        let row = columns
            .iter()
            .map(|series| series.get(idx).map(format_value))
            .collect::<Result<Vec<_>, _>>()?;
        table.add_row(row);
    }
    Ok(table)
}

/// The verdict of the correctness checks, green when they passed and red otherwise. `console`
/// drops the colors when the terminal does not support them.
pub fn check_result_message(passed: bool) -> String {
    if passed {
        style("Data correctness check passed.").green().to_string()
    } else {
        style("Data correctness check failed.").red().to_string()
    }
}

pub fn display_release_files(files: &[String]) {
    let mut table = new_table();
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Release file").add_attribute(Attribute::Bold),
    ]);
    for (idx, file) in files.iter().enumerate() {
        table.add_row(vec![idx.to_string(), file.clone()]);
    }
    if let Some(column) = table.column_mut(0) {
        column.set_cell_alignment(CellAlignment::Right);
    }
    println!("\n{}", table);
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Prints the errors and warnings of a validation report with remediation instructions.
pub fn display_validation_report(report: &ValidationReport, config: &Config) -> anyhow::Result<()> {
    if report.unmapped.height() > 0 {
        println!("\n{} Could not find OWID names for:", style(ERROR).red());
        println!("{}", frame_table(&report.unmapped)?);
        if let Some(scratch_csv) = &report.scratch_csv {
            println!(
                "\nSaved CSV file to be standardized at {}. \nRun it through the OWID standardizer and save in {}",
                style(absolute(scratch_csv)).magenta(),
                style(absolute(&config.locations_csv_path)).magenta()
            );
        }
    }
    if report.duplicates.height() > 0 {
        println!("\n{} Found duplicate rows:", style(ERROR).red());
        println!("{}", frame_table(&report.duplicates)?);
        println!(
            "\nPlease fix or remove the duplicate rows in the Excel file, and then save it again but under a new name, e.g. 2020-03-20-modified.xlsx"
        );
        println!(
            "Also please note down any changes you made in {}",
            style(absolute(&config.input_path.join("NOTES.md"))).magenta()
        );
    }
    if !report.missing_population.is_empty() {
        println!(
            "\n{} These entities were not found in the population dataset:",
            style(WARNING).yellow()
        );
        println!("{}\n", report.missing_population.join(", "));
    }
    Ok(())
}

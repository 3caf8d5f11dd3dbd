use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use covidgetter::{config::Config, Covidgetter};
use enum_dispatch::enum_dispatch;
use log::{debug, info, warn};
use spinners::{Spinner, Spinners};

use crate::display::{check_result_message, display_release_files, display_validation_report};
use crate::error::{CovidgetterCliError, CovidgetterCliResult};

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const DEFAULT_LAST_N: usize = 2;
const MANUAL_DOWNLOAD_URL: &str = "https://www.ecdc.europa.eu/en/publications-data/download-todays-data-geographic-distribution-covid-19-cases-worldwide";

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()>;
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(spinner: Option<Spinner>) {
    if let Some(mut s) = spinner {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Resolves the operator's answer to an index into `files`. An empty answer picks the newest
/// release; otherwise the answer is either a listed number or a file name.
fn parse_selection(input: &str, files: &[String]) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return (!files.is_empty()).then_some(0);
    }
    input
        .parse::<usize>()
        .ok()
        .filter(|idx| *idx < files.len())
        .or_else(|| files.iter().position(|file| file == input))
}

fn prompt_release<R: BufRead>(files: &[String], mut input: R) -> CovidgetterCliResult<String> {
    display_release_files(files);
    print!("Which release to use? [0] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    parse_selection(&answer, files)
        .map(|idx| files[idx].clone())
        .ok_or_else(|| CovidgetterCliError::InvalidSelection(answer.trim().to_string()))
}

/// Returns `file` if given, otherwise asks the operator to pick one of the releases on disk.
fn select_release(covidgetter: &Covidgetter, file: Option<&str>) -> CovidgetterCliResult<String> {
    if let Some(file) = file {
        return Ok(file.to_string());
    }
    println!(
        "\n[Note] If you don't see the latest report in the options below, please download the Excel file from:\n{MANUAL_DOWNLOAD_URL}\nThen move it to the folder {}\n",
        covidgetter.config.releases_path.display()
    );
    let files = covidgetter.release_files()?;
    if files.is_empty() {
        return Err(CovidgetterCliError::NoReleases(
            covidgetter.config.releases_path.clone(),
        ));
    }
    prompt_release(&files, io::stdin().lock())
}

/// Runs the correctness checks and prints the report. Returns whether they passed.
fn check(covidgetter: &Covidgetter, file: &str) -> CovidgetterCliResult<bool> {
    let report = covidgetter.validate(file)?;
    display_validation_report(&report, &covidgetter.config)?;
    println!("{}\n", check_result_message(report.passed()));
    Ok(report.passed())
}

fn export(covidgetter: &Covidgetter, file: &str, quiet: bool) {
    let sp = start_spinner(quiet, "Exporting CSVs");
    let result = covidgetter.export(file);
    stop_spinner(sp);
    match result {
        Ok(written) => {
            debug!("{written:#?}");
            println!(
                "Successfully exported CSVs to {}\n",
                covidgetter.config.output_path.display()
            );
        }
        Err(err) => {
            println!("ECDC Export failed: {err:#}\n");
            process::exit(1);
        }
    }
}

async fn download(covidgetter: &Covidgetter, last_n: usize, quiet: bool) -> CovidgetterCliResult<()> {
    let sp = start_spinner(quiet, "Attempting to download latest report");
    let result = covidgetter.download(last_n).await;
    stop_spinner(sp);
    let outcomes = result?;
    let downloaded = outcomes.iter().filter(|o| o.is_downloaded()).count();
    info!("Downloaded {downloaded} of {} candidate files", outcomes.len());
    Ok(())
}

/// Downloads ahead of the pipeline. The releases already on disk stay usable when this fails, so
/// the error is only logged. Returns whether the download step ran.
async fn download_or_warn(covidgetter: &Covidgetter, last_n: usize, quiet: bool) -> bool {
    match download(covidgetter, last_n, quiet).await {
        Ok(()) => true,
        Err(err) => {
            warn!("Could not download the latest releases, continuing with the files on disk: {err}");
            false
        }
    }
}

/// The `run` command goes through the whole pipeline: download, pick a release, check it and
/// export it.
#[derive(Args, Debug)]
pub struct RunPipelineCommand {
    #[arg(short, long, help = "Release file to process, skipping the prompt")]
    file: Option<String>,
    #[arg(long, help = "Do not attempt to download the latest releases")]
    skip_download: bool,
    #[arg(long, default_value_t = DEFAULT_LAST_N, help = "Number of days to download")]
    last_n: usize,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunPipelineCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()> {
        info!("Running `run` subcommand");
        let covidgetter = Covidgetter::new_with_config(config);
        if !self.skip_download {
            download_or_warn(&covidgetter, self.last_n, self.quiet).await;
        }
        let file = select_release(&covidgetter, self.file.as_deref())?;
        if !check(&covidgetter, &file)? {
            process::exit(1);
        }
        export(&covidgetter, &file, self.quiet);
        Ok(())
    }
}

/// The `download` command fetches the latest releases into the releases folder.
#[derive(Args, Debug)]
pub struct DownloadCommand {
    #[arg(long, default_value_t = DEFAULT_LAST_N, help = "Number of days to download")]
    last_n: usize,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DownloadCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()> {
        info!("Running `download` subcommand");
        download(&Covidgetter::new_with_config(config), self.last_n, self.quiet).await
    }
}

#[derive(Args, Debug)]
pub struct ReleasesCommand {}

impl RunCommand for ReleasesCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()> {
        info!("Running `releases` subcommand");
        let files = Covidgetter::new_with_config(config).release_files()?;
        display_release_files(&files);
        Ok(())
    }
}

/// The `check` command validates a release without exporting it.
#[derive(Args, Debug)]
pub struct CheckCommand {
    #[arg(short, long, help = "Release file to check, skipping the prompt")]
    file: Option<String>,
}

impl RunCommand for CheckCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()> {
        info!("Running `check` subcommand");
        let covidgetter = Covidgetter::new_with_config(config);
        let file = select_release(&covidgetter, self.file.as_deref())?;
        if !check(&covidgetter, &file)? {
            process::exit(1);
        }
        Ok(())
    }
}

/// The `export` command validates a release and writes the CSV files.
#[derive(Args, Debug)]
pub struct ExportCommand {
    #[arg(short, long, help = "Release file to export, skipping the prompt")]
    file: Option<String>,
    #[arg(long, help = "Export without running the correctness checks")]
    force: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ExportCommand {
    async fn run(&self, config: Config) -> CovidgetterCliResult<()> {
        info!("Running `export` subcommand");
        let covidgetter = Covidgetter::new_with_config(config);
        let file = select_release(&covidgetter, self.file.as_deref())?;
        if !self.force && !check(&covidgetter, &file)? {
            process::exit(1);
        }
        export(&covidgetter, &file, self.quiet);
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Covidgetter standardizes the daily ECDC COVID-19 release into the public dataset", long_about = None, name="covidgetter")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        long,
        help = "Path to a TOML config file. Defaults to `covidgetter/config.toml` in the user's config directory.",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress spinners to stdout. Prompt, results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Download, check and export a release
    Run(RunPipelineCommand),
    /// Download the releases of the last few days
    Download(DownloadCommand),
    /// List the release files available locally, newest first
    Releases(ReleasesCommand),
    /// Check a release for unmapped locations and duplicate rows
    Check(CheckCommand),
    /// Check a release and export the standardized CSVs
    Export(ExportCommand),
}

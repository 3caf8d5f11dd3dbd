//! Best-effort download of the latest release spreadsheets.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use reqwest::Client;

use crate::error::CovidgetterError;

/// Releases are published under either extension, depending on the day.
pub const RELEASE_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Downloaded(PathBuf),
    NotFound { path: PathBuf, status: u16 },
    Failed { path: PathBuf, reason: String },
}

impl FetchOutcome {
    pub fn is_downloaded(&self) -> bool {
        matches!(self, FetchOutcome::Downloaded(_))
    }
}

/// The `last_n` dates ending on `today`, oldest first.
pub fn dates_to_fetch(today: NaiveDate, last_n: usize) -> Vec<NaiveDate> {
    (0..last_n as i64)
        .rev()
        .filter_map(|offset| today.checked_sub_signed(Duration::days(offset)))
        .collect()
}

pub fn release_url(template: &str, date: NaiveDate, ext: &str) -> Result<String> {
    if !template.contains("{date}") {
        return Err(CovidgetterError::InvalidUrlTemplate(template.to_string()).into());
    }
    Ok(template
        .replace("{date}", &date.format("%Y-%m-%d").to_string())
        .replace("{ext}", ext))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn fetch_to_path(client: &Client, url: &str, dest: &Path) -> Result<Option<u16>> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Ok(Some(status.as_u16()));
    }
    let bytes = response.bytes().await?;
    let part = partial_path(dest);
    tokio::fs::write(&part, &bytes).await?;
    tokio::fs::rename(&part, dest).await?;
    Ok(None)
}

/// Fetches a single release into `dest`. Anything left behind by a failed attempt is removed.
pub async fn fetch_release(client: &Client, url: &str, dest: PathBuf) -> FetchOutcome {
    debug!("Fetching {url} into {}", dest.display());
    let outcome = match fetch_to_path(client, url, &dest).await {
        Ok(None) => return FetchOutcome::Downloaded(dest),
        Ok(Some(status)) => FetchOutcome::NotFound {
            path: dest.clone(),
            status,
        },
        Err(err) => FetchOutcome::Failed {
            path: dest.clone(),
            reason: err.to_string(),
        },
    };
    let part = partial_path(&dest);
    if tokio::fs::try_exists(&part).await.unwrap_or(false) {
        if let Err(err) = tokio::fs::remove_file(&part).await {
            warn!("Failed to remove {}: {err}", part.display());
        }
    }
    outcome
}

/// Attempts every candidate release for the `last_n` days ending on `today`, writing successful
/// downloads to `releases_path`. Failures are returned as outcomes and never abort the run.
pub async fn download_releases(
    client: &Client,
    template: &str,
    releases_path: &Path,
    today: NaiveDate,
    last_n: usize,
) -> Result<Vec<FetchOutcome>> {
    tokio::fs::create_dir_all(releases_path).await?;
    let mut outcomes = vec![];
    for date in dates_to_fetch(today, last_n) {
        for ext in RELEASE_EXTENSIONS {
            let url = release_url(template, date, ext)?;
            let dest = releases_path.join(format!("{}.{ext}", date.format("%Y-%m-%d")));
            let outcome = fetch_release(client, &url, dest).await;
            match &outcome {
                FetchOutcome::Downloaded(path) => info!("Downloaded {}", path.display()),
                FetchOutcome::NotFound { status, .. } => debug!("{url} returned {status}"),
                FetchOutcome::Failed { reason, .. } => warn!("Failed to fetch {url}: {reason}"),
            }
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_to_fetch_ends_today() {
        assert_eq!(
            dates_to_fetch(date(2020, 3, 1), 3),
            vec![date(2020, 2, 28), date(2020, 2, 29), date(2020, 3, 1)]
        );
        assert!(dates_to_fetch(date(2020, 3, 1), 0).is_empty());
    }

    #[test]
    fn release_url_substitutes_date_and_extension() {
        let url = release_url(
            "https://host/COVID-19-worldwide-{date}.{ext}",
            date(2020, 3, 20),
            "xlsx",
        )
        .unwrap();
        assert_eq!(url, "https://host/COVID-19-worldwide-2020-03-20.xlsx");
        assert!(release_url("https://host/latest.xlsx", date(2020, 3, 20), "xlsx").is_err());
    }

    #[tokio::test]
    async fn download_keeps_found_files_and_drops_missing_ones() {
        let server = MockServer::start_async().await;
        let found = server
            .mock_async(|when, then| {
                when.method(GET).path("/release-2020-03-20.xlsx");
                then.status(200).body("spreadsheet bytes");
            })
            .await;
        let missing = server
            .mock_async(|when, then| {
                when.method(GET).path("/release-2020-03-20.xls");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/release-{{date}}.{{ext}}", server.base_url());
        let outcomes = download_releases(
            &Client::new(),
            &template,
            dir.path(),
            date(2020, 3, 20),
            1,
        )
        .await
        .unwrap();

        found.assert_async().await;
        missing.assert_async().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_downloaded());
        assert_eq!(
            outcomes[1],
            FetchOutcome::NotFound {
                path: dir.path().join("2020-03-20.xls"),
                status: 404
            }
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("2020-03-20.xlsx")).unwrap(),
            "spreadsheet bytes"
        );
        assert!(!dir.path().join("2020-03-20.xls").exists());
        assert!(!dir.path().join("2020-03-20.xls.part").exists());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_earlier_download() {
        let server = MockServer::start_async().await;
        let gone = server
            .mock_async(|when, then| {
                when.method(GET).path("/release.xlsx");
                then.status(404);
            })
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("2020-03-20.xlsx");
        std::fs::write(&dest, "earlier download").unwrap();
        let outcome = fetch_release(&Client::new(), &server.url("/release.xlsx"), dest.clone()).await;

        gone.assert_async().await;
        assert!(!outcome.is_downloaded());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "earlier download");
        assert!(!partial_path(&dest).exists());
    }
}

//! Google Drive download client for the detector weights.
//!
//! Drive serves small files directly. Large ones trigger a virus-scan warning
//! that needs a confirmation token on a second request. The token comes
//! either as a `download_warning*` cookie or, on newer deployments, in an HTML
//! interstitial form.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::application::ports::WeightsSourcePort;
use crate::domain::errors::{DomainError, DomainResult};

pub const DRIVE_DOWNLOAD_URL: &str = "https://drive.google.com/uc?export=download";

const PROGRESS_STEP: u64 = 16 * 1024 * 1024;

pub struct GoogleDriveWeights {
    client: Client,
    base_url: String,
}

impl GoogleDriveWeights {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DRIVE_DOWNLOAD_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        // The confirmation round trip only works when cookies from the first
        // response are sent back.
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, base_url: base_url.into() })
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<u64> {
        let url = download_url(&self.base_url, file_id);
        let mut response = self.get(&url).await?;

        let cookie_token = confirm_token_from_cookies(
            response.cookies().map(|c| (c.name().to_string(), c.value().to_string())),
        );

        if let Some(token) = cookie_token {
            debug!("Drive requested confirmation via cookie");
            response = self.get(&format!("{url}&confirm={token}")).await?;
        } else if is_html(&response) {
            let page = response.text().await.context("reading Drive interstitial")?;
            let params = interstitial_params(&page)
                .ok_or_else(|| anyhow!("Drive returned an HTML page without a confirmation token"))?;
            debug!("Drive requested confirmation via interstitial page");
            response = self.get(&with_query(&url, &params)).await?;
        }

        if is_html(&response) {
            anyhow::bail!(
                "Drive returned an HTML page instead of file {file_id}; check that it is shared publicly"
            );
        }

        let part = part_path(dest);
        match write_body(response, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .with_context(|| format!("moving {} into place", part.display()))?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    warn!("Could not remove partial download {}: {}", part.display(), rm);
                }
                Err(e)
            }
        }
    }

    async fn get(&self, url: &str) -> Result<Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Ok(response.error_for_status()?)
    }
}

#[async_trait]
impl WeightsSourcePort for GoogleDriveWeights {
    async fn fetch_to(&self, file_id: &str, dest: &Path) -> DomainResult<u64> {
        self.download(file_id, dest)
            .await
            .map_err(|e| DomainError::OperationFailed(format!("weights download failed: {e:#}")))
    }
}

async fn write_body(mut response: Response, part: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(part)
        .await
        .with_context(|| format!("creating {}", part.display()))?;

    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP;
    while let Some(chunk) = response.chunk().await.context("reading download stream")? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if written >= next_report {
            debug!("Downloaded {} MiB", written / (1024 * 1024));
            next_report += PROGRESS_STEP;
        }
    }
    file.flush().await?;
    file.sync_all().await?;

    anyhow::ensure!(written > 0, "download finished with an empty body");
    Ok(written)
}

pub fn download_url(base_url: &str, file_id: &str) -> String {
    let sep = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{sep}id={file_id}")
}

pub fn confirm_token_from_cookies<I>(cookies: I) -> Option<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    cookies
        .into_iter()
        .find(|(name, _)| name.starts_with("download_warning"))
        .map(|(_, value)| value)
}

/// Query parameters needed to get past the "can't scan for viruses" page:
/// `confirm`, plus `uuid` when the form carries one.
pub fn interstitial_params(html: &str) -> Option<Vec<(String, String)>> {
    let confirm = hidden_input(html, "confirm").or_else(|| legacy_confirm_link(html))?;
    let mut params = vec![("confirm".to_string(), confirm)];
    if let Some(uuid) = hidden_input(html, "uuid") {
        params.push(("uuid".to_string(), uuid));
    }
    Some(params)
}

fn hidden_input(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let tag_start = html.find(&marker)?;
    let rest = &html[tag_start..];
    let tag = &rest[..rest.find('>').unwrap_or(rest.len())];
    let value_start = tag.find("value=\"")? + "value=\"".len();
    let value = &tag[value_start..];
    let value = &value[..value.find('"')?];
    (!value.is_empty()).then(|| value.to_string())
}

fn legacy_confirm_link(html: &str) -> Option<String> {
    let start = html.find("confirm=")? + "confirm=".len();
    let token: String = html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    (!token.is_empty()).then_some(token)
}

fn with_query(url: &str, params: &[(String, String)]) -> String {
    params
        .iter()
        .fold(url.to_string(), |acc, (k, v)| format!("{acc}&{k}={v}"))
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

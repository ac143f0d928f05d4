//! Authorized transfer of a product archive to local disk.
use crate::auth::BearerToken;
use crate::catalog::product_id_from_url;
use crate::error::{Error, Result};
use futures_util::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    AlreadyPresent,
}

pub trait AssetFetcher {
    async fn fetch(&self, url: &str, token: &BearerToken, dest: &Path) -> Result<FetchOutcome>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Redirects are handled in [`HttpFetcher::fetch`] so the bearer header
    /// survives the hop from the catalog host to the download host.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn follow(&self, url: &str, token: &BearerToken, label: &str) -> Result<Response> {
        let mut target = Url::parse(url).map_err(|e| Error::fetch(label, e))?;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .client
                .get(target.clone())
                .bearer_auth(token.secret())
                .send()
                .await
                .map_err(|e| Error::fetch(label, e))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::fetch(label, format!("{status} without a location")))?;
                target = target.join(location).map_err(|e| Error::fetch(label, e))?;
                debug!("Following redirect to {target}");
                continue;
            }
            if !status.is_success() {
                return Err(Error::fetch(label, format!("server answered with status {status}")));
            }
            return Ok(response);
        }

        Err(Error::fetch(label, "too many redirects"))
    }
}

impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, token: &BearerToken, dest: &Path) -> Result<FetchOutcome> {
        let label = product_id_from_url(url).unwrap_or_else(|| url.to_string());

        // Check if the output file already exists; return early if so
        if dest.exists() {
            info!("{} already exists", dest.display());
            return Ok(FetchOutcome::AlreadyPresent);
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::fetch(&label, e))?;
            }
        }

        let response = self.follow(url, token, &label).await?;

        let partial = partial_path(dest);
        let bytes = match write_body(response, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(Error::fetch(&label, e));
            }
        };

        fs::rename(&partial, dest)
            .await
            .map_err(|e| Error::fetch(&label, e))?;
        Ok(FetchOutcome::Downloaded { bytes })
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

async fn write_body(response: Response, partial: &Path) -> anyhow::Result<u64> {
    let mut file = fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut byte_count = 0u64;

    while let Some(bytes) = stream.try_next().await? {
        file.write_all(&bytes).await?;
        byte_count += bytes.len() as u64;
    }
    file.flush().await?;
    Ok(byte_count)
}

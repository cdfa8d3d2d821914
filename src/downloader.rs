use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Proxy};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Default GitHub REST API root.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Shared HTTP client plus the knobs that govern how it talks to the network.
///
/// Construct once per run and clone freely; clones share the connection pool.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    /// Number of attempts when fetching release metadata.
    pub retry_count: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Root of the releases API, e.g. `https://api.github.com`.
    pub api_base: String,
    token: Option<String>,
}

impl Downloader {
    /// Create a downloader with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(3, Duration::from_secs(3), None, GITHUB_API_BASE)
    }

    /// Create a downloader with explicit configuration.
    ///
    /// A `GITHUB_TOKEN` in the environment is sent with API requests.
    pub fn with_config(
        retry_count: u32,
        retry_delay: Duration,
        proxy: Option<String>,
        api_base: &str,
    ) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("bindl/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy_url) = &proxy {
            let proxy = Proxy::all(proxy_url)
                .map_err(|e| Error::Config(format!("invalid proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry_count: retry_count.max(1),
            retry_delay,
            api_base: api_base.trim_end_matches('/').to_owned(),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        })
    }

    /// GET `url`, following redirects, and return the whole body.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.get(url).await?;
        let body = resp.bytes().await.map_err(|e| Error::fetch(url, e))?;
        Ok(body.to_vec())
    }

    /// GET `url` and decode the body as UTF-8 text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self.fetch_bytes(url).await?;
        String::from_utf8(body).map_err(|e| Error::fetch(url, format!("body is not UTF-8: {e}")))
    }

    /// GET a JSON document from the releases API, retrying on failure.
    pub async fn fetch_api_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let mut last_err = None;
        for attempt in 0..self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.get_api_json(&url).await {
                Ok(v) => return Ok(v),
                Err(e @ Error::Json { .. }) => return Err(e),
                Err(e) => {
                    warn!("attempt {} of {} failed: {e}", attempt + 1, self.retry_count);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::fetch(&url, "no attempts made")))
    }

    async fn get_api_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| Error::fetch(url, e))?;
        let resp = check_status(url, resp).await?;
        let body = resp.bytes().await.map_err(|e| Error::fetch(url, e))?;
        serde_json::from_slice(&body).map_err(|source| Error::Json {
            url: url.to_owned(),
            source,
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(url, e))?;
        check_status(url, resp).await
    }

    /// Stream `url` into `dest`.
    ///
    /// The body lands in a temp file next to `dest` which is renamed into
    /// place once complete, so `dest` never holds a partial download.
    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let resp = self.get(url).await?;
        let dir = dest.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;

        let mut written: u64 = 0;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::fetch(url, e))?;
            tmp.write_all(&chunk).map_err(|e| Error::io(tmp.path(), e))?;
            written += chunk.len() as u64;
        }

        tmp.persist(dest).map_err(|e| Error::io(dest, e.error))?;
        Ok(written)
    }
}

async fn check_status(url: &str, resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body = body.trim();
    let message = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.chars().take(200).collect::<String>())
    };
    Err(Error::fetch(url, message))
}

/// One URL fetched to one path, optionally verified against a `.sha256` file.
///
/// Running a job is idempotent: a destination that already exists (and
/// matches its checksum, if any) is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub dest: PathBuf,
    pub sha256_url: Option<String>,
}

impl DownloadJob {
    pub fn new(url: impl Into<String>, dest: impl Into<PathBuf>, sha256_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            dest: dest.into(),
            sha256_url,
        }
    }

    /// Fetch the file unless it is already complete, then re-check it.
    pub async fn run(&self, downloader: &Downloader) -> Result<()> {
        if self.is_complete(downloader).await? {
            info!("already downloaded: {}", self.dest.display());
            return Ok(());
        }
        info!("downloading {} to {}", self.url, self.dest.display());
        let size = downloader.download_to(&self.url, &self.dest).await?;
        if !self.is_complete(downloader).await? {
            return Err(Error::Integrity {
                path: self.dest.clone(),
            });
        }
        info!("downloaded {} ({size} bytes)", self.dest.display());
        Ok(())
    }

    /// The destination exists and, when a checksum URL is set, its SHA-256
    /// equals the first token of the fetched checksum text.
    ///
    /// Fetching the checksum text can fail, which is reported as an error
    /// rather than "incomplete".
    pub async fn is_complete(&self, downloader: &Downloader) -> Result<bool> {
        if !self.dest.is_file() {
            return Ok(false);
        }
        let Some(sha256_url) = &self.sha256_url else {
            return Ok(true);
        };

        let text = downloader.fetch_text(sha256_url).await?;
        let expected = parse_checksum(&text).to_lowercase();
        let actual = sha256_file(&self.dest).await?;
        if expected != actual {
            warn!(
                "SHA256 mismatch for {}: {} != {}",
                self.dest.display(),
                expected.chars().take(8).collect::<String>(),
                &actual[..8]
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// First whitespace-delimited token of `sha256sum`-style output.
pub fn parse_checksum(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// Hex SHA-256 of a file's current contents.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher).map_err(|e| Error::io(&path, e))?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await?
}

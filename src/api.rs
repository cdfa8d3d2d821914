use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{Config, Source};
use crate::downloader::{Downloader, GITHUB_API_BASE};
use crate::error::Result;
use crate::extract::ExtractSettings;
use crate::github::{download_assets, get_latest_release};
use crate::http_source::download_http_assets;
use crate::progress::RunProgress;
use crate::recompress::{recompress_files, Compressor};

// ──────────────────────────────────────────────────────────────────────────────
// Api
// ──────────────────────────────────────────────────────────────────────────────

/// Top-level entry-point with a chainable builder API.
///
/// # Example
/// ```rust,no_run
/// use bindl::{Api, Config};
///
/// #[tokio::main]
/// async fn main() -> bindl::Result<()> {
///     let config = Config::from_toml_path("tool.toml".as_ref())?;
///     let written = Api::new()
///         .set_output_dir("./vendor")
///         .set_temp_dir(".temp")
///         .run(&config)
///         .await?;
///     println!("{} files", written.len());
///     Ok(())
/// }
/// ```
pub struct Api {
    output_dir: PathBuf,
    temp_dir: PathBuf,
    retry_count: u32,
    retry_delay: Duration,
    proxy: Option<String>,
    api_base: String,
    compressor: Compressor,
    progress: bool,
}

impl Api {
    /// Create a new `Api` with sensible defaults.
    ///
    /// Proxy is read from `HTTP_PROXY` / `HTTPS_PROXY` environment variables.
    pub fn new() -> Self {
        let proxy = std::env::var("HTTP_PROXY")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("HTTPS_PROXY").ok().filter(|s| !s.is_empty()));

        Self {
            output_dir: PathBuf::from("."),
            temp_dir: PathBuf::from(".temp"),
            retry_count: 3,
            retry_delay: Duration::from_secs(3),
            proxy,
            api_base: GITHUB_API_BASE.to_owned(),
            compressor: Compressor::default(),
            progress: true,
        }
    }

    /// Set the directory recompressed files are written under (builder).
    pub fn set_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the working directory for downloads and staged extracts (builder).
    pub fn set_temp_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.temp_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the external compressor (builder).
    pub fn set_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Point release lookups at a different API root (builder).
    pub fn set_api_base(mut self, base: &str) -> Self {
        self.api_base = base.to_owned();
        self
    }

    /// Disable progress bars (builder).
    pub fn no_progress(mut self) -> Self {
        self.progress = false;
        self
    }

    /// Set the number of attempts when listing releases (builder).
    pub fn set_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Set the retry delay (builder).
    pub fn set_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set an explicit HTTP/HTTPS proxy URL (builder).
    pub fn set_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_owned());
        self
    }

    /// Download, extract and recompress everything `config` describes.
    ///
    /// Returns the target paths, sorted. Safe to re-run: finished downloads,
    /// extracts and targets are reused.
    pub async fn run(&self, config: &Config) -> Result<Vec<PathBuf>> {
        let downloader = Downloader::with_config(
            self.retry_count,
            self.retry_delay,
            self.proxy.clone(),
            &self.api_base,
        )?;
        let progress = RunProgress::new(self.progress);
        let temp_root = self.temp_dir.join(config.temp_dir_identifier());
        let download_root = temp_root.join("download");

        let (files, release_name) = match &config.source {
            Source::GitHub(gh) => {
                let release = Arc::new(get_latest_release(&downloader, &gh.project).await?);
                let files = download_assets(
                    &downloader,
                    release.clone(),
                    &gh.included_release_files,
                    &download_root,
                    &progress.phase("downloading"),
                )
                .await?;
                (files, release.name.clone())
            }
            Source::Http(http) => {
                let files = download_http_assets(
                    &downloader,
                    &http.urls,
                    &download_root.join(&http.release_name),
                    &progress.phase("downloading"),
                )
                .await?;
                (files, http.release_name.clone())
            }
        };

        let settings = ExtractSettings {
            staging_root: temp_root.join("extract"),
            output_root: self.output_dir.clone(),
            template: config.target.clone(),
            is_acceptable_member: config.included_tarball_member_names.clone(),
            release_name,
        };
        let targets = recompress_files(
            files,
            settings,
            &self.compressor,
            &progress.extract_and_recompress(),
        )
        .await?;
        info!("{} files in {}", targets.len(), self.output_dir.display());
        Ok(targets)
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

//! Static name → URL sources.

use std::collections::BTreeMap;
use std::path::Path;

use indicatif::ProgressBar;
use tracing::info;

use crate::downloader::{DownloadJob, Downloader};
use crate::error::{Error, Result};
use crate::models::{Asset, AssetFile, AssetInfo};
use crate::runner::{run_jobs, DOWNLOAD_WORKERS};

/// Download every entry of `url_map` to `{download_root}/{name}`.
///
/// There is no checksum pairing for plain HTTP sources.
pub async fn download_http_assets(
    downloader: &Downloader,
    url_map: &BTreeMap<String, String>,
    download_root: &Path,
    progress: &ProgressBar,
) -> Result<Vec<AssetFile>> {
    std::fs::create_dir_all(download_root).map_err(|e| Error::io(download_root, e))?;

    let jobs: Vec<(AssetInfo, DownloadJob)> = url_map
        .iter()
        .map(|(name, url)| {
            let asset = AssetInfo {
                data: Asset {
                    name: name.clone(),
                    browser_download_url: url.clone(),
                },
                name: name.clone(),
            };
            (asset, DownloadJob::new(url.clone(), download_root.join(name), None))
        })
        .collect();

    info!("running {} downloads", jobs.len());
    progress.set_length(jobs.len() as u64);
    let files = run_jobs(jobs, DOWNLOAD_WORKERS, progress, |(asset, job)| {
        let downloader = downloader.clone();
        async move {
            job.run(&downloader).await?;
            Ok::<_, Error>(AssetFile {
                asset,
                local_path: job.dest,
                release: None,
            })
        }
    })
    .await?;
    progress.finish_and_clear();
    Ok(files)
}

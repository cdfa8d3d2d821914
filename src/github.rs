//! Release-based asset resolution against a GitHub-style releases API.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::info;

use crate::downloader::{DownloadJob, Downloader};
use crate::error::{Error, Result};
use crate::filter::NameFilter;
use crate::models::{AssetFile, AssetInfo, Release, ReleaseInfo};
use crate::runner::{run_jobs, DOWNLOAD_WORKERS};

/// Fetch the newest non-draft, non-prerelease release of `project_id`
/// (`owner/repo`).
pub async fn get_latest_release(downloader: &Downloader, project_id: &str) -> Result<ReleaseInfo> {
    info!("finding releases for {project_id}");
    let releases: Vec<Release> = downloader
        .fetch_api_json(&format!("/repos/{project_id}/releases"))
        .await?;
    let release = select_latest(releases).ok_or_else(|| Error::NoReleaseFound {
        project: project_id.to_owned(),
    })?;
    let ri = ReleaseInfo::new(release, project_id);
    info!("latest release: {}", ri.name);
    Ok(ri)
}

/// The eligible release with the greatest `created_at`. Ties go to the one
/// listed first.
fn select_latest(releases: Vec<Release>) -> Option<Release> {
    // `max_by` keeps the last of equal elements, so walk the list backwards.
    releases
        .into_iter()
        .filter(|r| !(r.draft || r.prerelease))
        .rev()
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
}

/// Download every asset of `release` accepted by `is_acceptable` into
/// `{download_root}/{release.name}/`.
///
/// A sibling asset named `{name}.sha256`, if present, is used to verify the
/// download.
pub async fn download_assets(
    downloader: &Downloader,
    release: Arc<ReleaseInfo>,
    is_acceptable: &NameFilter,
    download_root: &Path,
    progress: &ProgressBar,
) -> Result<Vec<AssetFile>> {
    let download_root = download_root.join(&release.name);
    std::fs::create_dir_all(&download_root).map_err(|e| Error::io(&download_root, e))?;

    let by_name: HashMap<&str, &str> = release
        .data
        .assets
        .iter()
        .map(|a| (a.name.as_str(), a.browser_download_url.as_str()))
        .collect();

    let jobs: Vec<(AssetInfo, DownloadJob)> = release
        .data
        .assets
        .iter()
        .filter(|a| is_acceptable.matches(&a.name))
        .map(|a| {
            let sha256_url = by_name
                .get(format!("{}.sha256", a.name).as_str())
                .map(|u| u.to_string());
            let job = DownloadJob::new(
                a.browser_download_url.clone(),
                download_root.join(&a.name),
                sha256_url,
            );
            (AssetInfo::from(a.clone()), job)
        })
        .collect();

    info!("running {} downloads", jobs.len());
    progress.set_length(jobs.len() as u64);
    let files = run_jobs(jobs, DOWNLOAD_WORKERS, progress, |(asset, job)| {
        let downloader = downloader.clone();
        let release = release.clone();
        async move {
            job.run(&downloader).await?;
            Ok::<_, Error>(AssetFile {
                asset,
                local_path: job.dest,
                release: Some(release),
            })
        }
    })
    .await?;
    progress.finish_and_clear();
    Ok(files)
}

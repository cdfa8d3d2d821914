//! Extract → dedup → recompress orchestration.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use indicatif::ProgressBar;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::extract::{extract_to_staging, ExtractSettings, RecompressJob};
use crate::models::AssetFile;
use crate::runner::{cpu_workers, run_jobs};

/// External gzip-compatible compressor, invoked as `program args... <input>`
/// and expected to write gzip data to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressor {
    pub program: String,
    pub args: Vec<String>,
}

impl Compressor {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `zopfli --gzip -c`
    pub fn zopfli() -> Self {
        Self::new("zopfli", ["--gzip", "-c"])
    }

    /// `gzip -9 -n -c`
    pub fn gzip() -> Self {
        Self::new("gzip", ["-9", "-n", "-c"])
    }

    async fn compress(&self, input: &Path) -> Result<Vec<u8>> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .output()
            .await
            .map_err(|e| self.failed(input, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(input, format!("{}: {}", output.status, stderr.trim())));
        }
        Ok(output.stdout)
    }

    fn failed(&self, input: &Path, message: String) -> Error {
        Error::Subprocess {
            program: self.program.clone(),
            input: input.to_path_buf(),
            message,
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::zopfli()
    }
}

/// Compress `job.extract_path` to `job.target_path`, verify the result
/// decompresses to the original bytes, then delete the staged file.
pub async fn recompress_file(job: &RecompressJob, compressor: &Compressor) -> Result<()> {
    if job.is_complete() {
        debug!("already recompressed: {}", job.target_path.display());
        remove_staged(&job.extract_path)?;
        return Ok(());
    }

    let compressed = compressor.compress(&job.extract_path).await?;
    let job = job.clone();
    tokio::task::spawn_blocking(move || write_verified(&job, &compressed)).await?
}

fn write_verified(job: &RecompressJob, compressed: &[u8]) -> Result<()> {
    let RecompressJob {
        extract_path,
        target_path,
    } = job;
    let original = std::fs::read(extract_path).map_err(|e| Error::io(extract_path, e))?;

    let dir = target_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(compressed).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| Error::io(tmp.path(), e))?;

    let written = std::fs::read(tmp.path()).map_err(|e| Error::io(tmp.path(), e))?;
    let mut roundtrip = Vec::with_capacity(original.len());
    let decoded = MultiGzDecoder::new(written.as_slice()).read_to_end(&mut roundtrip);
    if decoded.is_err() || roundtrip != original {
        return Err(Error::Consistency {
            source_path: extract_path.clone(),
            target: target_path.clone(),
        });
    }

    tmp.persist(target_path).map_err(|e| Error::io(target_path, e.error))?;
    info!(
        "compressed {} from {} to {} bytes",
        extract_path.display(),
        original.len(),
        written.len()
    );
    remove_staged(extract_path)
}

fn remove_staged(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Fail if two jobs share a target path.
pub fn check_unique_targets(jobs: &[RecompressJob]) -> Result<()> {
    let mut seen: HashMap<&Path, usize> = HashMap::new();
    for job in jobs {
        *seen.entry(job.target_path.as_path()).or_default() += 1;
    }
    let mut duplicates: Vec<PathBuf> = seen
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(p, _)| p.to_path_buf())
        .collect();
    if duplicates.is_empty() {
        return Ok(());
    }
    duplicates.sort();
    Err(Error::DuplicateTarget { paths: duplicates })
}

/// Progress bars for the two phases run by [`recompress_files`].
#[derive(Clone)]
pub struct PhaseProgress {
    pub extract: ProgressBar,
    pub recompress: ProgressBar,
}

/// Extract accepted members from every file, check target uniqueness, then
/// recompress whatever is not already in place.
///
/// Returns every target path, sorted.
pub async fn recompress_files(
    files: Vec<AssetFile>,
    settings: ExtractSettings,
    compressor: &Compressor,
    progress: &PhaseProgress,
) -> Result<Vec<PathBuf>> {
    info!("extracting files from {} tarballs", files.len());
    let settings = Arc::new(settings);
    progress.extract.set_length(files.len() as u64);
    let batches = run_jobs(files, cpu_workers(), &progress.extract, |af| {
        let settings = settings.clone();
        async move { tokio::task::spawn_blocking(move || extract_to_staging(&af, &settings)).await? }
    })
    .await?;
    progress.extract.finish_and_clear();

    let mut jobs: Vec<RecompressJob> = batches.into_iter().flatten().collect();
    if jobs.is_empty() {
        return Err(Error::NoContent);
    }
    check_unique_targets(&jobs)?;
    jobs.sort_by(|a, b| a.target_path.cmp(&b.target_path));
    let targets: Vec<PathBuf> = jobs.iter().map(|j| j.target_path.clone()).collect();

    if jobs.iter().all(RecompressJob::is_complete) {
        info!("all {} files already recompressed", jobs.len());
        return Ok(targets);
    }

    info!("recompressing {} files with {}", jobs.len(), compressor.program);
    progress.recompress.set_length(jobs.len() as u64);
    run_jobs(jobs, cpu_workers(), &progress.recompress, |job| {
        let compressor = compressor.clone();
        async move { recompress_file(&job, &compressor).await }
    })
    .await?;
    progress.recompress.finish_and_clear();
    Ok(targets)
}

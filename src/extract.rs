use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::filter::NameFilter;
use crate::models::AssetFile;
use crate::naming::{NameTemplate, NamingContext};

/// A staged, uncompressed member and where its recompressed form goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecompressJob {
    pub extract_path: PathBuf,
    pub target_path: PathBuf,
}

impl RecompressJob {
    pub fn is_complete(&self) -> bool {
        self.target_path.is_file()
    }
}

/// Inputs shared by every per-asset extraction in a run.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub staging_root: PathBuf,
    pub output_root: PathBuf,
    pub template: NameTemplate,
    pub is_acceptable_member: NameFilter,
    pub release_name: String,
}

/// Stage every accepted regular-file member of `af`'s tarball under
/// `{staging_root}/{release_name}/{asset}/{member}`.
///
/// Members already staged by an earlier run, or whose target already exists,
/// are not re-extracted. A job is returned for every accepted member either
/// way.
pub fn extract_to_staging(af: &AssetFile, settings: &ExtractSettings) -> Result<Vec<RecompressJob>> {
    let tarball = &af.local_path;
    let file_name = tarball
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if !(file_name.ends_with(".tar") || file_name.ends_with(".tar.gz")) {
        return Err(Error::Format {
            path: tarball.clone(),
            reason: "expected a .tar or .tar.gz file".into(),
        });
    }

    let mut archive = tar::Archive::new(open_maybe_gzip(tarball)?);
    let entries = archive.entries().map_err(|e| Error::io(tarball, e))?;
    let staging_dir = settings
        .staging_root
        .join(&settings.release_name)
        .join(&af.asset.name);

    let mut jobs = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::io(tarball, e))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member_path = entry.path().map_err(|e| Error::io(tarball, e))?.into_owned();
        let name = member_path.to_string_lossy().into_owned();
        if !settings.is_acceptable_member.matches(&name) {
            debug!("skipping member {name} of {}", af.asset.name);
            continue;
        }
        if !is_safe_member(&member_path) {
            return Err(Error::Format {
                path: tarball.clone(),
                reason: format!("member {name:?} escapes the extraction directory"),
            });
        }

        let ctx = NamingContext {
            asset_name: &af.asset.name,
            asset_name_cleaned: af.cleaned_name(),
            name: &name,
            release_name: &settings.release_name,
        };
        let target_path = settings.template.render(&ctx, &settings.output_root);
        let extract_path = staging_dir.join(&member_path);

        if target_path.is_file() {
            debug!("target exists, not staging {name}");
        } else if !extract_path.is_file() {
            write_atomically(&extract_path, &mut entry)?;
            info!("extracted {name} to {}", extract_path.display());
        }
        jobs.push(RecompressJob {
            extract_path,
            target_path,
        });
    }
    Ok(jobs)
}

/// Open `path` for reading, transparently un-gzipping it if it starts with
/// the gzip magic bytes. Every concatenated gzip member is decoded.
fn open_maybe_gzip(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let head = reader.fill_buf().map_err(|e| Error::io(path, e))?;
    if head.starts_with(&[0x1f, 0x8b]) {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn is_safe_member(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn write_atomically(dest: &Path, contents: &mut impl Read) -> Result<()> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    std::io::copy(contents, &mut tmp).map_err(|e| Error::io(dest, e))?;
    tmp.persist(dest).map_err(|e| Error::io(dest, e.error))?;
    Ok(())
}

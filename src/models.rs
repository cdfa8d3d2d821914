use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A release object as returned by `GET /repos/{owner}/{repo}/releases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    pub created_at: String,
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// A resolved release.
#[derive(Debug, Clone)]
pub struct ReleaseInfo {
    pub data: Release,
    /// Tag name with one leading `v` removed.
    pub name: String,
    /// Repository part of `owner/repo`.
    pub project_name: String,
}

impl ReleaseInfo {
    pub fn new(data: Release, project_id: &str) -> Self {
        let name = data
            .tag_name
            .strip_prefix('v')
            .unwrap_or(&data.tag_name)
            .to_owned();
        let project_name = project_id
            .split_once('/')
            .map(|(_, repo)| repo)
            .unwrap_or_default()
            .to_owned();
        Self {
            data,
            name,
            project_name,
        }
    }

    /// Strip one leading `{project}-`, `{project}_`, `{release}-` or
    /// `{release}_` from an asset name, first match wins.
    pub fn clean_asset_name<'a>(&self, asset_name: &'a str) -> &'a str {
        let prefixes = [
            format!("{}-", self.project_name),
            format!("{}_", self.project_name),
            format!("{}-", self.name),
            format!("{}_", self.name),
        ];
        prefixes
            .iter()
            .find_map(|p| asset_name.strip_prefix(p.as_str()))
            .unwrap_or(asset_name)
    }
}

/// An artifact, either from a release or synthesized from a static URL map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub data: Asset,
    pub name: String,
}

impl From<Asset> for AssetInfo {
    fn from(data: Asset) -> Self {
        Self {
            name: data.name.clone(),
            data,
        }
    }
}

/// An asset that has been downloaded to `local_path`.
#[derive(Debug, Clone)]
pub struct AssetFile {
    pub asset: AssetInfo,
    pub local_path: PathBuf,
    /// Owning release; `None` for HTTP-sourced files.
    pub release: Option<Arc<ReleaseInfo>>,
}

impl AssetFile {
    /// The asset name with release/project prefixes removed; identity for
    /// files that did not come from a release.
    pub fn cleaned_name(&self) -> &str {
        match &self.release {
            Some(release) => release.clean_asset_name(&self.asset.name),
            None => &self.asset.name,
        }
    }
}

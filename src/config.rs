//! Declarative vendoring spec, loaded from TOML.
//!
//! ```toml
//! [source]
//! github = "owner/repo"
//! included-release-files = ['tool-.*linux\.tar\.gz$']
//! included-tarball-member-names = ["bin/"]
//!
//! [target]
//! gz-pattern = "{name|basename}-{release_name}.gz"
//! ```
//!
//! An `http = { "name.tar.gz" = "https://..." }` table (plus an optional
//! `release_name`, default `"current"`) may be given instead of `github`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::filter::NameFilter;
use crate::naming::NameTemplate;

/// Release name used for HTTP sources that do not set one.
pub const DEFAULT_RELEASE_NAME: &str = "current";

/// Keys a table did not recognise. They are reported and otherwise ignored.
type Unknown = BTreeMap<String, toml::Value>;

#[derive(Debug, Deserialize)]
struct RawConfig {
    source: RawSource,
    target: RawTarget,
    #[serde(flatten)]
    unknown: Unknown,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    github: Option<String>,
    http: Option<BTreeMap<String, String>>,
    release_name: Option<String>,
    #[serde(rename = "included-release-files", default)]
    included_release_files: Vec<String>,
    #[serde(rename = "included-tarball-member-names", default)]
    included_tarball_member_names: Vec<String>,
    #[serde(flatten)]
    unknown: Unknown,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(rename = "gz-pattern")]
    gz_pattern: String,
    #[serde(flatten)]
    unknown: Unknown,
}

/// Assets come from the newest release of a GitHub project.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    /// `owner/repo`
    pub project: String,
    pub included_release_files: NameFilter,
}

/// Assets come from a fixed name → URL map.
#[derive(Debug, Clone)]
pub struct HttpSource {
    pub urls: BTreeMap<String, String>,
    pub release_name: String,
}

#[derive(Debug, Clone)]
pub enum Source {
    GitHub(GitHubSource),
    Http(HttpSource),
}

/// A validated vendoring spec.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: Option<PathBuf>,
    pub source: Source,
    pub included_tarball_member_names: NameFilter,
    pub target: NameTemplate,
}

impl Config {
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text, Some(path))
    }

    pub fn from_toml_str(text: &str, config_path: Option<&Path>) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        warn_unknown("", &raw.unknown);
        warn_unknown("source.", &raw.source.unknown);
        warn_unknown("target.", &raw.target.unknown);
        let member_filter = compile(&raw.source.included_tarball_member_names)?;
        let target = NameTemplate::parse(&raw.target.gz_pattern)?;

        let source = match (raw.source.github, raw.source.http) {
            (Some(project), None) => {
                if raw.source.release_name.is_some() {
                    warn!("ignoring `release_name`: github sources use the release tag");
                }
                if !is_project_id(&project) {
                    return Err(Error::Config(format!(
                        "github project {project:?} is not of the form owner/repo"
                    )));
                }
                Source::GitHub(GitHubSource {
                    project,
                    included_release_files: compile(&raw.source.included_release_files)?,
                })
            }
            (None, Some(urls)) => {
                for (name, url) in &urls {
                    if !is_plain_file_name(name) {
                        return Err(Error::Config(format!(
                            "http asset name {name:?} must be a plain file name"
                        )));
                    }
                    reqwest::Url::parse(url)
                        .map_err(|e| Error::Config(format!("invalid URL for {name}: {e}")))?;
                }
                Source::Http(HttpSource {
                    urls,
                    release_name: raw
                        .source
                        .release_name
                        .unwrap_or_else(|| DEFAULT_RELEASE_NAME.to_owned()),
                })
            }
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "source must set exactly one of `github` or `http`, not both".into(),
                ))
            }
            (None, None) => {
                return Err(Error::Config(
                    "source must set one of `github` or `http`".into(),
                ))
            }
        };

        Ok(Self {
            config_path: config_path.map(Path::to_path_buf),
            source,
            included_tarball_member_names: member_filter,
            target,
        })
    }

    /// Directory name that namespaces this spec's working files.
    pub fn temp_dir_identifier(&self) -> String {
        match &self.source {
            Source::GitHub(gh) => gh.project.replace('/', "__"),
            Source::Http(_) => self
                .config_path
                .as_deref()
                .and_then(Path::file_stem)
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "http".to_owned()),
        }
    }
}

fn warn_unknown(table: &str, unknown: &Unknown) {
    for key in unknown.keys() {
        warn!("ignoring unknown config key `{table}{key}`");
    }
}

fn compile(patterns: &[String]) -> Result<NameFilter> {
    NameFilter::new(patterns).map_err(|e| Error::Config(format!("invalid pattern: {e}")))
}

fn is_project_id(s: &str) -> bool {
    matches!(s.split_once('/'), Some((owner, repo)) if !owner.is_empty() && !repo.is_empty())
}

fn is_plain_file_name(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

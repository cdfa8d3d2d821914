use std::path::PathBuf;

use thiserror::Error;

/// Result type used throughout `bindl`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the download, extract and recompress pipeline.
///
/// Every variant aborts the phase it occurs in and, with it, the whole run.
/// Work already finished stays on disk, so re-running resumes.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx response or transport failure.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// The post-download completeness or checksum re-check did not pass.
    #[error("failed to download file {}: integrity check did not pass after write", path.display())]
    Integrity { path: PathBuf },

    #[error("no non-draft, non-prerelease release found for {project}")]
    NoReleaseFound { project: String },

    /// The artifact is not a `.tar`/`.tar.gz` archive, or holds an unsafe member.
    #[error("unsupported artifact {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("invalid naming template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("no files to recompress; the tarball member patterns may be wrong")]
    NoContent,

    #[error("duplicate target filenames: {}", display_paths(paths))]
    DuplicateTarget { paths: Vec<PathBuf> },

    #[error("compressor {program} failed on {}: {message}", input.display())]
    Subprocess {
        program: String,
        input: PathBuf,
        message: String,
    },

    /// Decompressing the freshly written target did not reproduce the input.
    #[error("recompressed {} does not decompress to the contents of {}", target.display(), source_path.display())]
    Consistency {
        source_path: PathBuf,
        target: PathBuf,
    },

    #[error("io error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed response from {url}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("worker task failed")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn fetch(url: &str, message: impl ToString) -> Self {
        Error::Fetch {
            url: url.to_owned(),
            message: message.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

//! # bindl
//!
//! Vendor binaries out of release tarballs.
//!
//! Given a declarative spec (a GitHub project or a static URL map, include
//! patterns, and a target naming template), `bindl` downloads the matching
//! artifacts, verifies them against sibling `.sha256` assets, extracts the
//! selected tarball members and writes each one as an individually
//! recompressed `.gz` file at a deterministic path. Every step is idempotent,
//! so an interrupted run resumes where it stopped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bindl::{Api, Config};
//!
//! #[tokio::main]
//! async fn main() -> bindl::Result<()> {
//!     let config = Config::from_toml_str(
//!         r#"
//!         [source]
//!         github = "owner/tool"
//!         included-release-files = ['tool-.*linux\.tar\.gz$']
//!         included-tarball-member-names = ["bin/"]
//!
//!         [target]
//!         gz-pattern = "{name|basename}-{release_name}.gz"
//!         "#,
//!         None,
//!     )?;
//!     Api::new().set_output_dir("./vendor").run(&config).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod extract;
pub mod filter;
pub mod github;
pub mod http_source;
pub mod models;
pub mod naming;
pub mod progress;
pub mod recompress;
pub mod runner;

pub use api::Api;
pub use config::{Config, Source};
pub use downloader::{DownloadJob, Downloader};
pub use error::{Error, Result};
pub use extract::RecompressJob;
pub use filter::NameFilter;
pub use naming::{NameTemplate, NamingContext};
pub use recompress::Compressor;

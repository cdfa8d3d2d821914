use std::path::PathBuf;
use std::process::ExitCode;

use bindl::progress::{global_multi_progress, IndicatifWriter};
use bindl::{Api, Compressor, Config};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Download release tarballs and vendor selected members as recompressed .gz files.
#[derive(Debug, Parser)]
#[command(name = "bindl", version, about)]
struct Args {
    /// Path to the TOML spec.
    spec_toml: PathBuf,

    /// Directory to write recompressed files to.
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Working directory for downloads and extracted files.
    #[arg(long, default_value = ".temp")]
    temp_dir: PathBuf,

    /// gzip-compatible compressor to run as `<PROG> [ARGS...] <file>`.
    #[arg(long, default_value = "zopfli")]
    compressor: String,

    /// Space-separated arguments passed to the compressor before the input
    /// file [default: `--gzip -c` for zopfli, `-c` otherwise].
    #[arg(long, allow_hyphen_values = true, value_delimiter = ' ')]
    compressor_args: Option<Vec<String>>,

    /// Hide progress bars.
    #[arg(long)]
    no_progress: bool,

    /// Log more (repeat for trace output).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn compressor(&self) -> Compressor {
        match &self.compressor_args {
            Some(args) => Compressor::new(&self.compressor, args),
            None if self.compressor == "zopfli" => Compressor::zopfli(),
            None => Compressor::new(&self.compressor, ["-c"]),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(IndicatifWriter::new(global_multi_progress()))
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> bindl::Result<()> {
    let config = Config::from_toml_path(&args.spec_toml)?;
    let mut api = Api::new()
        .set_output_dir(&args.output_dir)
        .set_temp_dir(&args.temp_dir)
        .set_compressor(args.compressor());
    if args.no_progress {
        api = api.no_progress();
    }
    api.run(&config).await?;
    Ok(())
}

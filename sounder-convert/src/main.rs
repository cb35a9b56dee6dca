use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

use sounder_convert::batch::convert_batch;
use sounder_convert::scan::find_capture_files;
use sounder_convert::{CancelToken, ConvertOptions};

/// Convert multibeam capture files to swath containers.
#[derive(Parser, Debug)]
#[command(name = "sounder-convert", version, about)]
struct Cli {
    /// Capture files or directories to convert
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the output containers
    #[arg(short, long)]
    output: PathBuf,

    /// Store containers uncompressed
    #[arg(long)]
    no_compress: bool,

    /// Reconvert files whose containers are already up to date
    #[arg(long)]
    overwrite: bool,

    /// Search subdirectories of directory inputs
    #[arg(short, long)]
    recursive: bool,

    /// Worker threads (0 = one per core)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Print the batch summary as JSON on stdout
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();

    let mut files = Vec::new();
    for input in &cli.inputs {
        if input.is_dir() {
            files.extend(
                find_capture_files(input, cli.recursive)
                    .with_context(|| format!("scanning {}", input.display()))?,
            );
        } else {
            files.push(input.clone());
        }
    }
    anyhow::ensure!(!files.is_empty(), "no capture files to convert");

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("creating {}", cli.output.display()))?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, finishing current records");
            cancel.cancel();
        })
        .context("installing interrupt handler")?;
    }

    let options = ConvertOptions {
        compress: !cli.no_compress,
        overwrite: cli.overwrite,
        jobs: cli.jobs,
    };
    let summary = convert_batch(&files, &cli.output, &options, &cancel);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else {
        eprintln!(
            "converted {}, skipped {}, failed {} ({} bytes saved)",
            summary.converted, summary.skipped, summary.failed, summary.bytes_saved
        );
        for error in &summary.errors {
            eprintln!("  {}", error);
        }
    }

    if summary.failed > 0 || cancel.is_cancelled() {
        std::process::exit(1);
    }
    Ok(())
}

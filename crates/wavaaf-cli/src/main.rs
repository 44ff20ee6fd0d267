//! WAVsToAAF command line converter
//!
//! ```text
//! wavaaf [OPTIONS] [INPUT] [OUTPUT_DIR]
//! ```
//!
//! INPUT is a WAV file or a folder (default: current directory); OUTPUT_DIR
//! defaults to `./aaf_output`. Settings come from
//! `~/.config/wavaaf/config.yaml` and can be overridden per run:
//!
//! - `--link`: reference the WAV files instead of embedding their PCM
//! - `--fps <RATE>`: one of 23.98, 23.976, 24, 25, 29.97, 30, 50, 59.94, 60
//! - `--drop-frame`: drop-frame timecode for 29.97/59.94
//! - `--exact`: only exact UCS id prefixes, no fuzzy matching
//! - `--recursive`: descend into subfolders
//! - `--workers <N>`: parallel conversions (1-16)
//! - `--taxonomy <FILE>`: external UCS table (YAML or CSV)
//! - `--config <FILE>`: alternate config file
//! - `--save-config`: write the effective settings back to the config file

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use wavaaf_core::batch::{self, BatchJob, BatchProgress, FileStatus};
use wavaaf_core::config::{self, AppConfig, CONFIG_FILE_NAME};
use wavaaf_core::timecode::RateSpec;

const DEFAULT_OUTPUT_DIR: &str = "aaf_output";

#[derive(Debug, Default)]
struct Args {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
    save_config: bool,
    link: bool,
    fps: Option<String>,
    drop_frame: bool,
    exact: bool,
    recursive: bool,
    workers: Option<usize>,
    taxonomy: Option<PathBuf>,
}

fn usage() -> String {
    format!(
        "Usage: wavaaf [--link] [--fps RATE] [--drop-frame] [--exact] [--recursive] \
         [--workers N] [--taxonomy FILE] [--config FILE] [--save-config] [INPUT] [OUTPUT_DIR]\n\
         Frame rates: {}",
        RateSpec::LABELS.join(", ")
    )
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    let mut positional = Vec::new();
    let mut iter = raw.into_iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .with_context(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--link" => args.link = true,
            "--drop-frame" => args.drop_frame = true,
            "--exact" => args.exact = true,
            "--recursive" | "-r" => args.recursive = true,
            "--save-config" => args.save_config = true,
            "--fps" => args.fps = Some(value("--fps")?),
            "--workers" => {
                let n = value("--workers")?;
                args.workers = Some(n.parse().with_context(|| format!("Invalid worker count: {}", n))?);
            }
            "--taxonomy" => args.taxonomy = Some(PathBuf::from(value("--taxonomy")?)),
            "--config" => args.config_path = Some(PathBuf::from(value("--config")?)),
            flag if flag.starts_with("--") => bail!("Unknown option: {}\n{}", flag, usage()),
            _ => positional.push(PathBuf::from(&arg)),
        }
    }

    if positional.len() > 2 {
        bail!("Too many arguments\n{}", usage());
    }
    let mut positional = positional.into_iter();
    args.input = positional.next();
    args.output = positional.next();
    Ok(args)
}

/// Command line flags override the config file
fn apply_overrides(config: &mut AppConfig, args: &Args) -> Result<()> {
    if args.link {
        config.embed = false;
    }
    if let Some(fps) = &args.fps {
        RateSpec::parse(fps)?;
        config.frame_rate = fps.clone();
    }
    if args.drop_frame {
        config.drop_frame = true;
    }
    if args.exact {
        config.exact_category_match_only = true;
    }
    if args.recursive {
        config.recursive = true;
    }
    if let Some(workers) = args.workers {
        config.parallel_workers = workers;
    }
    if let Some(taxonomy) = &args.taxonomy {
        config.taxonomy_path = Some(taxonomy.clone());
    }
    Ok(())
}

fn run() -> Result<bool> {
    let args = parse_args(std::env::args().skip(1))?;

    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| config::default_config_path(CONFIG_FILE_NAME));
    let mut app_config: AppConfig = config::load_config(&config_path);
    apply_overrides(&mut app_config, &args)?;
    if args.save_config {
        config::save_config(&app_config, &config_path)?;
    }

    let input = args.input.clone().unwrap_or_else(|| PathBuf::from("."));
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    println!("Input:  {}", input.display());
    println!("Output: {}", output.display());
    println!(
        "Mode:   {} at {} fps",
        if app_config.embed { "embedded" } else { "linked" },
        app_config.frame_rate
    );
    println!();

    let job = BatchJob::new(input, output.clone(), app_config);
    let (progress_tx, progress_rx) = std::sync::mpsc::channel();
    let cancel_flag = Arc::new(AtomicBool::new(false));

    let worker = std::thread::spawn(move || batch::run(&job, Some(progress_tx), cancel_flag));

    for message in progress_rx {
        match message {
            BatchProgress::Started { total } => println!("Converting {} file(s)", total),
            BatchProgress::FileStarted { path, index, total } => {
                log::debug!("[{}/{}] {}", index + 1, total, path.display())
            }
            BatchProgress::FileCompleted(result) => match result.status {
                FileStatus::Failed => println!(
                    "  FAILED  {}: {}",
                    result.path.display(),
                    result.error.as_deref().unwrap_or("unknown error")
                ),
                status => println!(
                    "  {:<9} {} [{}]",
                    status.as_str(),
                    result.path.display(),
                    result.ucs_id.as_deref().unwrap_or("-")
                ),
            },
            BatchProgress::AllComplete { .. } => {}
        }
    }

    let report = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Batch thread panicked"))??;

    println!();
    println!(
        "Done: {} converted, {} failed, {} need category review",
        report.converted(),
        report.failed(),
        report.low_confidence.len()
    );
    if !report.low_confidence.is_empty() {
        println!(
            "Review list: {}",
            output.join(batch::LOW_CONFIDENCE_REPORT).display()
        );
    }

    Ok(report.failed() == 0)
}

fn main() -> ExitCode {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("wavaaf {} starting up", env!("CARGO_PKG_VERSION"));

    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_positional_and_flags() {
        let parsed = args(&["--link", "in", "--fps", "29.97", "out", "-r"]).unwrap();
        assert_eq!(parsed.input, Some(PathBuf::from("in")));
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
        assert!(parsed.link && parsed.recursive);

        let mut config = AppConfig::default();
        apply_overrides(&mut config, &parsed).unwrap();
        assert!(!config.embed);
        assert_eq!(config.frame_rate, "29.97");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(args(&["--fps"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["a", "b", "c"]).is_err());
        assert!(args(&["--workers", "many"]).is_err());

        let parsed = args(&["--fps", "12"]).unwrap();
        assert!(apply_overrides(&mut AppConfig::default(), &parsed).is_err());
    }
}

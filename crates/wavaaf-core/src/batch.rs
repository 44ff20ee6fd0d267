//! Batch conversion of a folder of WAV files
//!
//! Scans the input, converts each file on a rayon worker pool and folds the
//! per-file outcomes into a [`BatchReport`].
//!
//! # Usage
//!
//! ```ignore
//! let (progress_tx, progress_rx) = std::sync::mpsc::channel();
//! let cancel_flag = Arc::new(AtomicBool::new(false));
//!
//! let job = BatchJob::new(input, output_dir, config);
//! std::thread::spawn(move || run(&job, Some(progress_tx), cancel_flag));
//!
//! // Poll progress_rx for updates
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::aaf::{assemble, AssemblyOptions, FileIdentity};
use crate::config::AppConfig;
use crate::error::{self, ConvertError, ErrorKind};
use crate::graph::{ContainerBuilder, ObjectGraph};
use crate::output::write_atomic;
use crate::ucs::{CategorizationResult, CategoryMatcher, MetadataHints, Taxonomy};
use crate::wav::read_wav;

/// Written into the output directory after every batch
pub const LOW_CONFIDENCE_REPORT: &str = "ucs_low_confidence.csv";
pub const RESULTS_REPORT: &str = "conversion_results.csv";

/// Suffix of the object-graph manifest written per input file
pub const OUTPUT_SUFFIX: &str = ".aaf.json";

const INPUT_EXTENSIONS: [&str; 3] = ["wav", "wave", "bwf"];

/// Final state of one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Converted,
    /// Converted, but some metadata chunks were abandoned
    Partial,
    Failed,
    Cancelled,
}

impl FileStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Converted => "converted",
            FileStatus::Partial => "partial",
            FileStatus::Failed => "failed",
            FileStatus::Cancelled => "cancelled",
        }
    }
}

/// Result record for one input file
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub status: FileStatus,
    /// Manifest path when converted
    pub output: Option<PathBuf>,
    pub ucs_id: Option<String>,
    pub score: Option<f64>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Partial-metadata warnings
    pub warnings: Vec<String>,
}

impl FileResult {
    fn new(path: &Path, status: FileStatus) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
            output: None,
            ucs_id: None,
            score: None,
            error: None,
            error_kind: None,
            warnings: Vec::new(),
        }
    }

    fn failed(path: &Path, error: &ConvertError) -> Self {
        Self {
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            ..Self::new(path, FileStatus::Failed)
        }
    }
}

/// A categorization that needs manual review
#[derive(Debug, Clone, PartialEq)]
pub struct LowConfidenceRecord {
    pub path: PathBuf,
    pub description: String,
    pub ucs_id: String,
    pub category: String,
    pub subcategory: String,
    pub score: f64,
}

/// Everything one file's pipeline produces
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub result: FileResult,
    pub low_confidence: Option<LowConfidenceRecord>,
}

impl From<FileResult> for FileOutcome {
    fn from(result: FileResult) -> Self {
        Self {
            result,
            low_confidence: None,
        }
    }
}

/// Progress updates sent from the batch thread
#[derive(Debug, Clone)]
pub enum BatchProgress {
    Started {
        total: usize,
    },
    FileStarted {
        path: PathBuf,
        index: usize,
        total: usize,
    },
    FileCompleted(FileResult),
    AllComplete {
        converted: usize,
        failed: usize,
    },
}

/// Per-file results folded after the parallel map
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<FileResult>,
    pub low_confidence: Vec<LowConfidenceRecord>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: FileOutcome) {
        self.results.push(outcome.result);
        if let Some(record) = outcome.low_confidence {
            self.low_confidence.push(record);
        }
    }

    pub fn count(&self, status: FileStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Converted files, with or without metadata warnings
    pub fn converted(&self) -> usize {
        self.count(FileStatus::Converted) + self.count(FileStatus::Partial)
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    /// Write both CSV reports into `dir`; both always get a header
    pub fn write_reports(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut low = String::from("file,description,ucs_id,category,subcategory,score\n");
        for record in &self.low_confidence {
            low.push_str(&csv_row(&[
                &record.path.display().to_string(),
                &record.description,
                &record.ucs_id,
                &record.category,
                &record.subcategory,
                &format!("{:.1}", record.score),
            ]));
        }

        let mut results = String::from("file,status,output,ucs_id,score,error_kind,error\n");
        for result in &self.results {
            results.push_str(&csv_row(&[
                &result.path.display().to_string(),
                result.status.as_str(),
                &result
                    .output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                result.ucs_id.as_deref().unwrap_or(""),
                &result.score.map(|s| format!("{:.1}", s)).unwrap_or_default(),
                result.error_kind.map(ErrorKind::as_str).unwrap_or(""),
                &result
                    .error
                    .clone()
                    .or_else(|| (!result.warnings.is_empty()).then(|| result.warnings.join("; ")))
                    .unwrap_or_default(),
            ]));
        }

        let mut written = Vec::with_capacity(2);
        for (name, contents) in [(LOW_CONFIDENCE_REPORT, low), (RESULTS_REPORT, results)] {
            let path = dir.join(name);
            written.push(
                write_atomic(&path, contents.as_bytes())
                    .with_context(|| format!("Failed to write report: {:?}", path))?,
            );
        }
        Ok(written)
    }
}

impl FromIterator<FileOutcome> for BatchReport {
    fn from_iter<I: IntoIterator<Item = FileOutcome>>(iter: I) -> Self {
        let mut report = BatchReport::default();
        for outcome in iter {
            report.push(outcome);
        }
        report
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

/// Shared, read-only state of a conversion run
pub struct Converter {
    matcher: CategoryMatcher,
    assembly: AssemblyOptions,
}

impl Converter {
    pub fn new(taxonomy: Arc<Taxonomy>, config: &AppConfig) -> Result<Self> {
        let assembly = config
            .assembly_options()
            .context("Invalid frame rate in configuration")?;
        Ok(Self {
            matcher: CategoryMatcher::new(taxonomy, config.match_options()),
            assembly,
        })
    }

    /// Read, categorize, assemble and save one file
    ///
    /// Never fails; every error becomes a `Failed` result record.
    pub fn process_file(&self, path: &Path, output: &Path) -> FileOutcome {
        log::info!("process_file: Processing {:?}", path);
        match self.convert(path, output) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("process_file: {:?} failed: {}", path, e);
                FileResult::failed(path, &e).into()
            }
        }
    }

    fn convert(&self, path: &Path, output: &Path) -> error::Result<FileOutcome> {
        let open_error = |source| ConvertError::Open {
            path: path.to_path_buf(),
            source,
        };
        let identity = FileIdentity::from_path(path).map_err(open_error)?;
        let mut reader = BufReader::new(File::open(&identity.path).map_err(open_error)?);

        let metadata = read_wav(&mut reader)?;
        for warning in &metadata.warnings {
            log::warn!("process_file: {:?}: {}", path, warning);
        }

        let file_name = identity
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let description = metadata.description().unwrap_or("").to_string();
        let hints = MetadataHints::collect(&metadata);
        let categorization = self.matcher.categorize(&file_name, &description, &hints);

        let mut graph = ObjectGraph::new();
        assemble(
            &mut graph,
            &identity,
            &metadata,
            categorization.as_ref(),
            &self.assembly,
            &mut reader,
        )?;
        graph.save(output)?;

        let mut result = if metadata.is_partial() {
            FileResult {
                error_kind: Some(ErrorKind::PartialMetadata),
                ..FileResult::new(path, FileStatus::Partial)
            }
        } else {
            FileResult::new(path, FileStatus::Converted)
        };
        result.output = Some(output.to_path_buf());
        result.warnings = metadata.warnings.iter().map(|w| w.to_string()).collect();

        let low_confidence = match &categorization {
            Some(found) => {
                result.ucs_id = Some(found.primary.id.clone()).filter(|id| !id.is_empty());
                result.score = Some(found.primary.score);
                self.low_confidence_record(path, &description, found)
            }
            None => {
                log::debug!("process_file: {:?} has no UCS category", path);
                None
            }
        };

        log::info!(
            "process_file: {:?} -> {:?} ({})",
            path,
            output,
            result.ucs_id.as_deref().unwrap_or("uncategorized")
        );
        Ok(FileOutcome {
            result,
            low_confidence,
        })
    }

    fn low_confidence_record(
        &self,
        path: &Path,
        description: &str,
        found: &CategorizationResult,
    ) -> Option<LowConfidenceRecord> {
        if !found.is_low_confidence(self.assembly.low_confidence_threshold) {
            return None;
        }
        Some(LowConfidenceRecord {
            path: path.to_path_buf(),
            description: description.to_string(),
            ucs_id: found.primary.id.clone(),
            category: found.primary.category.clone(),
            subcategory: found.primary.subcategory.clone(),
            score: found.primary.score,
        })
    }
}

/// Input files: a single file, or the WAV files in a folder
pub fn scan_inputs(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    log::info!("scan_inputs: Scanning {:?}", input);

    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        anyhow::bail!("Input not found: {:?}", input);
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(input).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("scan_inputs: Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        let is_wav = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                INPUT_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known))
            });
        if entry.file_type().is_file() && is_wav {
            files.push(path.to_path_buf());
        }
    }
    files.sort();

    log::info!("scan_inputs: Found {} WAV file(s)", files.len());
    Ok(files)
}

/// Manifest path for each input, unique within the output directory
pub fn plan_outputs(files: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut used = HashSet::new();
    files
        .iter()
        .map(|file| {
            let stem = file
                .file_stem()
                .map(|s| sanitize_filename(&s.to_string_lossy()))
                .unwrap_or_else(|| "audio".to_string());
            let mut name = format!("{}{}", stem, OUTPUT_SUFFIX);
            let mut n = 2;
            while !used.insert(name.to_lowercase()) {
                name = format!("{}_{}{}", stem, n, OUTPUT_SUFFIX);
                n += 1;
            }
            output_dir.join(name)
        })
        .collect()
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// Taxonomy from the configured file, or the built-in table
pub fn load_taxonomy(config: &AppConfig) -> Result<Arc<Taxonomy>> {
    let taxonomy = match &config.taxonomy_path {
        Some(path) => Taxonomy::load(path)
            .with_context(|| format!("Failed to load UCS table: {:?}", path))?,
        None => Taxonomy::builtin().context("Failed to load built-in UCS table")?,
    };
    log::info!("load_taxonomy: {} categories", taxonomy.len());
    Ok(Arc::new(taxonomy))
}

/// One conversion run
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub config: AppConfig,
}

impl BatchJob {
    pub fn new(input: PathBuf, output_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            input,
            output_dir,
            config,
        }
    }
}

/// Convert `files` on a worker pool
///
/// Cancellation stops new files from starting; they are recorded as
/// cancelled while files already in flight finish.
pub fn run_batch(
    files: &[PathBuf],
    output_dir: &Path,
    converter: &Converter,
    workers: usize,
    progress_tx: Option<Sender<BatchProgress>>,
    cancel_flag: Arc<AtomicBool>,
) -> Result<BatchReport> {
    let start_time = Instant::now();
    let total = files.len();
    let send = |message: BatchProgress| {
        if let Some(tx) = &progress_tx {
            let _ = tx.send(message);
        }
    };

    log::info!("run_batch: Starting conversion of {} file(s)", total);
    send(BatchProgress::Started { total });

    let outputs = plan_outputs(files, output_dir);

    let num_workers = workers.clamp(1, 16);
    log::info!("run_batch: Using {} parallel workers", num_workers);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .build()
        .context("Failed to create thread pool")?;

    let outcomes: Vec<FileOutcome> = pool.install(|| {
        files
            .par_iter()
            .zip(outputs.par_iter())
            .enumerate()
            .map(|(index, (path, output))| {
                if cancel_flag.load(Ordering::Relaxed) {
                    let result = FileResult::new(path, FileStatus::Cancelled);
                    send(BatchProgress::FileCompleted(result.clone()));
                    return result.into();
                }

                send(BatchProgress::FileStarted {
                    path: path.clone(),
                    index,
                    total,
                });
                let outcome = converter.process_file(path, output);
                send(BatchProgress::FileCompleted(outcome.result.clone()));
                outcome
            })
            .collect()
    });

    let report: BatchReport = outcomes.into_iter().collect();

    log::info!(
        "run_batch: Complete in {:.1}s - {} converted, {} failed, {} cancelled, {} low confidence",
        start_time.elapsed().as_secs_f64(),
        report.converted(),
        report.failed(),
        report.count(FileStatus::Cancelled),
        report.low_confidence.len()
    );
    send(BatchProgress::AllComplete {
        converted: report.converted(),
        failed: report.failed(),
    });

    Ok(report)
}

/// Scan, convert and write the reports for one job
pub fn run(
    job: &BatchJob,
    progress_tx: Option<Sender<BatchProgress>>,
    cancel_flag: Arc<AtomicBool>,
) -> Result<BatchReport> {
    std::fs::create_dir_all(&job.output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", job.output_dir))?;

    let taxonomy = load_taxonomy(&job.config)?;
    let converter = Converter::new(taxonomy, &job.config)?;
    let files = scan_inputs(&job.input, job.config.recursive)?;

    let report = run_batch(
        &files,
        &job.output_dir,
        &converter,
        job.config.workers(),
        progress_tx,
        cancel_flag,
    )?;
    report.write_reports(&job.output_dir)?;
    Ok(report)
}

// The scrub pipeline.
//
// `ScrubEngine` owns everything that is built once per run (shingler, MinHash
// permutations, keyword belt, blocklist index) and is shared read-only by
// every worker. Each corpus file is streamed in input order through
// read -> decide -> write into a staged temp file, and only a fully written
// file is swapped over the original.

use anyhow::{Context, Error, Result};
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::fs::create_dir_all;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

use crate::args::ScrubArgs;
use crate::atomic::{AtomicRewrite, StagedFile};
use crate::blocklist::{load_blocklist, BlocklistOptions, BlocklistStats};
use crate::config::Config;
use crate::error::ScrubError;
use crate::io::{build_pbar, expand_corpus_paths, get_nested_json_val, open_reader, LineReader, RawLine};
use crate::keywords::KeywordBelt;
use crate::lsh::{EntryId, LshIndex};
use crate::minhash::{MinHasher, Signature};
use crate::shingle::Shingler;

pub const REPORT_FILENAME: &str = "scrub_report.jsonl";

/*=================================================================
=                             ENGINE                              =
=================================================================*/

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Keep,
    /// Empty problem text: nothing to compare, written through.
    KeepEmpty,
    DropSimilar {
        matches: Vec<EntryId>,
        similarity: Option<f64>,
    },
    DropKeyword(String),
    Malformed(String),
    /// Whitespace-only physical line, not a record.
    Blank,
}

impl Verdict {
    pub fn keeps(&self) -> bool {
        matches!(self, Verdict::Keep | Verdict::KeepEmpty)
    }
}

pub struct ScrubEngine {
    shingler: Shingler,
    hasher: MinHasher,
    keywords: KeywordBelt,
    index: LshIndex,
    blocklist_stats: BlocklistStats,
    content_key: String,
    verify_threshold: Option<f64>,
}

impl ScrubEngine {
    /// Validates the configuration, then loads the blocklist. Either failing
    /// is fatal: no corpus file may be touched without a usable index.
    /// `Config::from_args` leaves validation to this point.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let params = config.lsh_params()?;
        info!(
            num_perm = params.num_perm(),
            bands = params.bands(),
            rows = params.rows(),
            approx_threshold = params.approx_threshold(),
            recall_at_threshold = params.collision_probability(config.threshold),
            "LSH parameters"
        );

        let shingler = Shingler::new(config.ngram_size, config.tokenizer, &config.punctuation_chars);
        let hasher = MinHasher::new(config.num_perm, config.hash_seed);
        let keywords = KeywordBelt::new(&config.keywords, &shingler)?;

        let options = BlocklistOptions {
            content_key: &config.content_key,
            min_tokens: config.min_blocklist_tokens,
        };
        let blocklist = load_blocklist(&config.blocklist, &options, &shingler, &hasher, params)?;

        Ok(ScrubEngine {
            shingler,
            hasher,
            keywords,
            index: blocklist.index,
            blocklist_stats: blocklist.stats,
            content_key: config.content_key.clone(),
            verify_threshold: config.verify_similarity.then_some(config.threshold),
        })
    }

    pub fn index(&self) -> &LshIndex {
        &self.index
    }

    pub fn blocklist_stats(&self) -> &BlocklistStats {
        &self.blocklist_stats
    }

    /// `None` for text with no tokens.
    pub fn signature(&self, text: &str) -> Option<Signature> {
        let shingles = self.shingler.shingles(text);
        if shingles.is_empty() {
            return None;
        }
        Some(self.hasher.signature(&shingles))
    }

    pub fn classify_text(&self, text: &str) -> Result<Verdict, ScrubError> {
        let normalized = self.shingler.normalize(text);
        let shingles = self.shingler.shingles_of_normalized(&normalized);
        if shingles.is_empty() {
            return Ok(Verdict::KeepEmpty);
        }

        let signature = self.hasher.signature(&shingles);
        match self.verify_threshold {
            Some(threshold) => {
                let scored: Vec<(EntryId, f64)> = self
                    .index
                    .query_with_similarity(&signature)?
                    .into_iter()
                    .filter(|(_, sim)| *sim >= threshold)
                    .collect();
                let best = scored.first().map(|&(_, sim)| sim);
                if let Some(best) = best {
                    return Ok(Verdict::DropSimilar {
                        matches: scored.into_iter().map(|(id, _)| id).collect(),
                        similarity: Some(best),
                    });
                }
            }
            None => {
                let matches = self.index.query(&signature)?;
                if !matches.is_empty() {
                    return Ok(Verdict::DropSimilar {
                        matches,
                        similarity: None,
                    });
                }
            }
        }

        if let Some(keyword) = self.keywords.find(&normalized) {
            return Ok(Verdict::DropKeyword(keyword.to_string()));
        }
        Ok(Verdict::Keep)
    }

    pub fn classify_line(&self, line: &RawLine) -> Result<Verdict, ScrubError> {
        let text = match line {
            RawLine::Text(text) => text,
            RawLine::Invalid => return Ok(Verdict::Malformed("invalid UTF-8".to_string())),
        };
        if text.trim().is_empty() {
            return Ok(Verdict::Blank);
        }
        let record: Value = match serde_json::from_str(text) {
            Ok(record) => record,
            Err(e) => return Ok(Verdict::Malformed(e.to_string())),
        };
        match get_nested_json_val(&record, &self.content_key) {
            Ok(problem) => self.classify_text(problem),
            Err(e) => Ok(Verdict::Malformed(e.to_string())),
        }
    }
}

/*=================================================================
=                          PER-FILE SCRUB                         =
=================================================================*/

#[derive(Debug, Clone, Serialize)]
pub struct Removal {
    pub file: String,
    pub line: usize,
    pub reason: &'static str,
    pub matched_entries: Vec<EntryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub kept: usize,
    pub kept_empty: usize,
    pub removed_similar: usize,
    pub removed_keyword: usize,
    pub malformed: usize,
    #[serde(skip)]
    pub removals: Vec<Removal>,
}

impl FileReport {
    fn new(path: &Path) -> Self {
        FileReport {
            path: path.to_path_buf(),
            ..FileReport::default()
        }
    }

    pub fn removed(&self) -> usize {
        self.removed_similar + self.removed_keyword
    }

    pub fn written(&self) -> usize {
        self.kept + self.kept_empty
    }

    fn record(&mut self, line: usize, verdict: Verdict) {
        match verdict {
            Verdict::Keep => self.kept += 1,
            Verdict::KeepEmpty => self.kept_empty += 1,
            Verdict::Blank => {}
            Verdict::Malformed(reason) => {
                debug!(file = %self.path.display(), line, reason = %reason, "skipping malformed record");
                self.malformed += 1;
            }
            Verdict::DropSimilar {
                matches,
                similarity,
            } => {
                self.removed_similar += 1;
                self.removals.push(Removal {
                    file: self.path.display().to_string(),
                    line,
                    reason: "similar",
                    matched_entries: matches,
                    keyword: None,
                    similarity,
                });
            }
            Verdict::DropKeyword(keyword) => {
                self.removed_keyword += 1;
                self.removals.push(Removal {
                    file: self.path.display().to_string(),
                    line,
                    reason: "keyword",
                    matched_entries: Vec::new(),
                    keyword: Some(keyword),
                    similarity: None,
                });
            }
        }
    }
}

/// Read, decide and write the whole file into a staged replacement. The
/// original is not modified; the caller commits or discards the result.
pub fn stage_file(
    engine: &ScrubEngine,
    path: &Path,
    batch_size: usize,
) -> Result<(StagedFile, FileReport), Error> {
    let mut report = FileReport::new(path);
    let reader = open_reader(path).with_context(|| format!("opening {:?}", path))?;
    let mut lines = LineReader::new(reader).enumerate();
    let mut output =
        AtomicRewrite::begin(path).with_context(|| format!("creating temp file for {:?}", path))?;
    let mut batch: Vec<(usize, RawLine)> = Vec::with_capacity(batch_size);

    loop {
        batch.clear();
        for (line_num, line) in lines.by_ref().take(batch_size) {
            let line = line.with_context(|| format!("reading {:?} line {}", path, line_num))?;
            batch.push((line_num, line));
        }
        if batch.is_empty() {
            break;
        }

        let verdicts: Vec<Verdict> = batch
            .par_iter()
            .map(|(_, line)| engine.classify_line(line))
            .collect::<Result<_, ScrubError>>()?;

        for ((line_num, line), verdict) in batch.iter().zip(verdicts) {
            if verdict.keeps() {
                if let Some(text) = line.as_str() {
                    output
                        .write_line(text)
                        .with_context(|| format!("writing temp file for {:?}", path))?;
                }
            }
            report.record(*line_num, verdict);
        }
    }

    let staged = output
        .finish()
        .with_context(|| format!("finalizing temp file for {:?}", path))?;
    Ok((staged, report))
}

pub fn scrub_file(
    engine: &ScrubEngine,
    path: &Path,
    batch_size: usize,
    dry_run: bool,
) -> Result<FileReport, Error> {
    let start = Instant::now();
    let (staged, report) = stage_file(engine, path, batch_size)?;
    if dry_run {
        staged.discard()?;
    } else {
        staged
            .commit()
            .with_context(|| format!("replacing {:?}", path))?;
    }

    info!(
        file = %path.display(),
        kept = report.kept,
        kept_empty = report.kept_empty,
        removed_similar = report.removed_similar,
        removed_keyword = report.removed_keyword,
        malformed = report.malformed,
        dry_run,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scrubbed file"
    );
    Ok(report)
}

/*=================================================================
=                           CORPUS SCRUB                          =
=================================================================*/

#[derive(Debug, Default)]
pub struct ScrubSummary {
    pub files: Vec<FileReport>,
    pub failures: Vec<(PathBuf, String)>,
}

impl ScrubSummary {
    pub fn kept(&self) -> usize {
        self.files.iter().map(|f| f.kept).sum()
    }

    pub fn kept_empty(&self) -> usize {
        self.files.iter().map(|f| f.kept_empty).sum()
    }

    pub fn removed(&self) -> usize {
        self.files.iter().map(|f| f.removed()).sum()
    }

    pub fn malformed(&self) -> usize {
        self.files.iter().map(|f| f.malformed).sum()
    }

    pub fn report_for(&self, path: &Path) -> Option<&FileReport> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// Scrub every corpus file in parallel against the shared engine. A file that
/// fails is left untouched and recorded; the others proceed.
pub fn scrub_corpus(engine: &ScrubEngine, config: &Config) -> Result<ScrubSummary, Error> {
    let own_outputs = own_output_paths(config);
    let files: Vec<PathBuf> = expand_corpus_paths(&config.corpus_input)?
        .into_iter()
        .filter(|path| {
            let own = own_outputs.iter().any(|other| same_file(path, other));
            if own {
                info!(file = %path.display(), "skipping blocklist/report inside corpus input");
            }
            !own
        })
        .collect();
    if files.is_empty() {
        return Err(ScrubError::NoCorpusFiles(config.corpus_input.clone()).into());
    }
    info!(files = files.len(), dry_run = config.dry_run, "scrubbing corpus");

    let pbar = build_pbar(files.len(), "Corpus files");
    let reports: DashMap<PathBuf, FileReport> = DashMap::new();
    let failures: DashMap<PathBuf, String> = DashMap::new();

    files.par_iter().for_each(|path| {
        match scrub_file(engine, path, config.batch_size, config.dry_run) {
            Ok(report) => {
                reports.insert(path.clone(), report);
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(file = %path.display(), error = %reason, "scrub failed, original left untouched");
                failures.insert(path.clone(), reason);
            }
        }
        pbar.inc(1);
    });
    pbar.finish();

    let mut summary = ScrubSummary {
        files: reports.into_iter().map(|(_, report)| report).collect(),
        failures: failures.into_iter().collect(),
    };
    summary.files.sort_by(|a, b| a.path.cmp(&b.path));
    summary.failures.sort();
    Ok(summary)
}

// Files this run reads or writes that may live under the corpus input.
fn own_output_paths(config: &Config) -> Vec<PathBuf> {
    let mut paths = vec![config.blocklist.clone()];
    if let Some(dir) = &config.report_output_dir {
        paths.push(dir.join(REPORT_FILENAME));
    }
    paths
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub fn save_scrub_report(summary: &ScrubSummary, output_dir: &Path) -> Result<PathBuf, Error> {
    create_dir_all(output_dir)?;
    let output_file = output_dir.join(REPORT_FILENAME);

    let mut output = AtomicRewrite::begin(&output_file)?;
    for report in &summary.files {
        for removal in &report.removals {
            output.write_line(&serde_json::to_string(removal)?)?;
        }
    }
    output.finish()?.commit()?;
    Ok(output_file)
}

fn print_summary(summary: &ScrubSummary, dry_run: bool) {
    println!("=== SCRUB SUMMARY{} ===", if dry_run { " (DRY RUN)" } else { "" });
    for report in &summary.files {
        println!(
            "{}: kept {} | empty kept {} | removed {} (similar {}, keyword {}) | malformed skipped {}",
            report.path.display(),
            report.kept,
            report.kept_empty,
            report.removed(),
            report.removed_similar,
            report.removed_keyword,
            report.malformed,
        );
    }
    for (path, reason) in &summary.failures {
        println!("{}: FAILED ({})", path.display(), reason);
    }
    println!(
        "Total: kept {} | empty kept {} | removed {} | malformed skipped {} | failed files {}",
        summary.kept(),
        summary.kept_empty(),
        summary.removed(),
        summary.malformed(),
        summary.failures.len()
    );
}

pub fn execute_scrub(args: &ScrubArgs) -> Result<ScrubSummary, Error> {
    let start = Instant::now();
    let config = Config::from_args(args)?;
    let engine = ScrubEngine::from_config(&config)?;
    let summary = scrub_corpus(&engine, &config)?;

    if let Some(dir) = &config.report_output_dir {
        let path = save_scrub_report(&summary, dir)?;
        info!(report = %path.display(), "wrote removal report");
    }
    print_summary(&summary, config.dry_run);
    info!(elapsed_s = start.elapsed().as_secs(), "scrub complete");

    if !summary.failures.is_empty() {
        return Err(ScrubError::FilesFailed {
            failed: summary.failures.len(),
            total: summary.files.len() + summary.failures.len(),
        }
        .into());
    }
    Ok(summary)
}

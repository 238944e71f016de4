use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::args::ScrubArgs;
use crate::error::ScrubError;
use crate::lsh::LshParams;
use crate::shingle::Tokenizer;

/*=================================================================
=                             CONFIG                              =
=================================================================*/

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Inputs
    #[serde(default)]
    pub blocklist: PathBuf,
    #[serde(default)]
    pub corpus_input: PathBuf,
    #[serde(default = "default_content_key")]
    pub content_key: String,

    // MinHash / LSH parameters
    #[serde(default = "default_num_perm")]
    pub num_perm: usize,
    #[serde(default)]
    pub num_bands: Option<usize>,
    #[serde(default)]
    pub band_size: Option<usize>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_ngram_size")]
    pub ngram_size: usize,
    #[serde(default)]
    pub hash_seed: u64,
    #[serde(default)]
    pub tokenizer: Tokenizer,
    #[serde(default)]
    pub punctuation_chars: String,

    // Blocklist filtering
    #[serde(default = "default_min_blocklist_tokens")]
    pub min_blocklist_tokens: usize,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,

    // Processing options
    #[serde(default)]
    pub verify_similarity: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub report_output_dir: Option<PathBuf>,
}

// Rows per band when no split is configured. Short rows keep recall high for
// 3-token shingles, where swapping two words already costs about half of a
// short problem's shingles.
pub const DEFAULT_BAND_SIZE: usize = 4;

fn default_content_key() -> String {
    "problem".to_string()
}

fn default_num_perm() -> usize {
    128
}

fn default_threshold() -> f64 {
    0.85
}

fn default_ngram_size() -> usize {
    3
}

fn default_min_blocklist_tokens() -> usize {
    4 // shorter fragments match far too much
}

fn default_keywords() -> Vec<String> {
    ["AIME 2024", "AIME 2025", "AMC 2023", "AMC 2024"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_batch_size() -> usize {
    1024
}

impl Default for Config {
    fn default() -> Self {
        Config {
            blocklist: PathBuf::new(),
            corpus_input: PathBuf::new(),
            content_key: default_content_key(),
            num_perm: default_num_perm(),
            num_bands: None,
            band_size: None,
            threshold: default_threshold(),
            ngram_size: default_ngram_size(),
            hash_seed: 0,
            tokenizer: Tokenizer::default(),
            punctuation_chars: String::new(),
            min_blocklist_tokens: default_min_blocklist_tokens(),
            keywords: default_keywords(),
            verify_similarity: false,
            batch_size: default_batch_size(),
            dry_run: false,
            report_output_dir: None,
        }
    }
}

pub fn read_config(config_path: &Path) -> Result<Config, Error> {
    let file = File::open(config_path)
        .map_err(|e| anyhow::anyhow!("cannot open config {:?}: {}", config_path, e))?;
    let config: Config = serde_yaml::from_reader(BufReader::new(file))?;
    Ok(config)
}

impl Config {
    /// Load the YAML file named by `--config` (or start from defaults) and
    /// apply command-line overrides. Validation is done once, by
    /// `ScrubEngine::from_config`, before any file is opened.
    pub fn from_args(args: &ScrubArgs) -> Result<Config, Error> {
        let mut config = match &args.config {
            Some(path) => read_config(path)?,
            None => Config::default(),
        };
        config.apply_overrides(args);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &ScrubArgs) {
        if let Some(path) = &args.blocklist {
            self.blocklist = path.clone();
        }
        if let Some(path) = &args.input {
            self.corpus_input = path.clone();
        }
        if let Some(key) = &args.content_key {
            self.content_key = key.clone();
        }
        if let Some(n) = args.num_perm {
            self.num_perm = n;
        }
        if args.num_bands.is_some() {
            self.num_bands = args.num_bands;
        }
        if args.band_size.is_some() {
            self.band_size = args.band_size;
        }
        if let Some(t) = args.threshold {
            self.threshold = t;
        }
        if let Some(k) = args.ngram_size {
            self.ngram_size = k;
        }
        if let Some(n) = args.min_blocklist_tokens {
            self.min_blocklist_tokens = n;
        }
        if !args.keywords.is_empty() {
            self.keywords = args.keywords.clone();
        }
        if let Some(seed) = args.hash_seed {
            self.hash_seed = seed;
        }
        if let Some(n) = args.batch_size {
            self.batch_size = n;
        }
        if let Some(dir) = &args.report_output_dir {
            self.report_output_dir = Some(dir.clone());
        }
        self.verify_similarity |= args.verify_similarity;
        self.dry_run |= args.dry_run;
    }

    pub fn validate(&self) -> Result<(), ScrubError> {
        if self.blocklist.as_os_str().is_empty() {
            return Err(ScrubError::InvalidConfig("`blocklist` is required".to_string()));
        }
        if self.corpus_input.as_os_str().is_empty() {
            return Err(ScrubError::InvalidConfig("`corpus_input` is required".to_string()));
        }
        if self.content_key.is_empty() {
            return Err(ScrubError::InvalidConfig("`content_key` must not be empty".to_string()));
        }
        if self.ngram_size == 0 {
            return Err(ScrubError::InvalidConfig("`ngram_size` must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ScrubError::InvalidConfig("`batch_size` must be at least 1".to_string()));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ScrubError::InvalidConfig(format!(
                "`threshold` must be in (0, 1], got {}",
                self.threshold
            )));
        }
        self.lsh_params()?;
        Ok(())
    }

    /// Explicit bands/rows must multiply to `num_perm`; a single one given
    /// implies the other. With neither given, bands of `DEFAULT_BAND_SIZE`
    /// rows are used (32 x 4 for 128 permutations), falling back to a split
    /// derived from `threshold` when `num_perm` is not a multiple of it.
    pub fn lsh_params(&self) -> Result<LshParams, ScrubError> {
        let num_perm = self.num_perm;
        match (self.num_bands, self.band_size) {
            (Some(bands), Some(rows)) => LshParams::new(num_perm, bands, rows),
            (Some(bands), None) => {
                let rows = if bands > 0 && num_perm % bands == 0 { num_perm / bands } else { 0 };
                LshParams::new(num_perm, bands, rows)
            }
            (None, Some(rows)) => {
                let bands = if rows > 0 && num_perm % rows == 0 { num_perm / rows } else { 0 };
                LshParams::new(num_perm, bands, rows)
            }
            (None, None) if num_perm > 0 && num_perm % DEFAULT_BAND_SIZE == 0 => {
                LshParams::new(num_perm, num_perm / DEFAULT_BAND_SIZE, DEFAULT_BAND_SIZE)
            }
            (None, None) => LshParams::for_threshold(num_perm, self.threshold),
        }
    }
}

// File plumbing shared by the blocklist loader, the scrubber and add-ids:
// compression-aware readers, corpus discovery and progress bars.

use anyhow::{Error, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CORPUS_EXTENSIONS: [&str; 3] = [".jsonl", ".jsonl.gz", ".jsonl.zst"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead> = match Compression::from_path(path) {
        Compression::Gzip => Box::new(BufReader::new(GzDecoder::new(file))),
        Compression::Zstd => Box::new(BufReader::new(zstd::stream::read::Decoder::new(file)?)),
        Compression::None => Box::new(BufReader::new(file)),
    };
    Ok(reader)
}

/// One physical line. `Text` has its line terminator removed; `Invalid` holds
/// lines that are not UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawLine {
    Text(String),
    Invalid,
}

impl RawLine {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RawLine::Text(line) => Some(line),
            RawLine::Invalid => None,
        }
    }
}

/// Iterates physical lines without giving up on invalid UTF-8 the way
/// `BufRead::lines` would.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader {
            inner,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.inner.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                match String::from_utf8(std::mem::take(&mut self.buf)) {
                    Ok(line) => Some(Ok(RawLine::Text(line))),
                    Err(_) => Some(Ok(RawLine::Invalid)),
                }
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn has_corpus_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| CORPUS_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
        .unwrap_or(false)
}

/// A single file is returned as-is; a directory is walked recursively for
/// corpus files. Hidden files (our own temp files included) are skipped.
/// Output is sorted so runs are reproducible.
pub fn expand_corpus_paths(input: &Path) -> Result<Vec<PathBuf>, Error> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.exists() {
        anyhow::bail!("corpus input does not exist: {:?}", input);
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(input).follow_links(true) {
        let entry = entry?;
        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if entry.file_type().is_file() && !hidden && has_corpus_extension(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn build_pbar(len: usize, label: &str) -> ProgressBar {
    let pbar = ProgressBar::new(len as u64);
    let template = format!(
        "{} {{bar:40.cyan/blue}} [{{elapsed_precise}}/{{eta_precise}}] {{pos}}/{{len}}",
        label
    );
    if let Ok(style) = ProgressStyle::with_template(&template) {
        pbar.set_style(style.progress_chars("#>-"));
    }
    pbar
}

/// Resolve a dotted key (`"data.problem"`) against a JSON object.
pub fn get_nested_json_val<'a>(obj: &'a Value, key: &str) -> Result<&'a str, Error> {
    let mut current = obj;
    for subkey in key.split('.') {
        current = current
            .get(subkey)
            .ok_or_else(|| anyhow::anyhow!("Key '{}' not found in JSON object", subkey))?;
    }

    current
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Value at key '{}' is not a string", key))
}

// One-time load of the reference (banned) corpus into an LshIndex.
//
// Plain text files hold one problem per line. Files whose name contains
// `.jsonl` hold JSON objects and the problem is read from `content_key`.
// Entry ids are 0-based physical line numbers, so reports can point back into
// the reference file.

use anyhow::{Error, Result};
use rayon::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::ScrubError;
use crate::io::{get_nested_json_val, open_reader, LineReader, RawLine};
use crate::lsh::{BlocklistEntry, EntryId, LshIndex, LshParams};
use crate::minhash::MinHasher;
use crate::shingle::Shingler;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlocklistStats {
    pub lines: usize,
    pub indexed: usize,
    pub skipped_blank: usize,
    pub skipped_short: usize,
    pub skipped_malformed: usize,
}

impl BlocklistStats {
    pub fn skipped(&self) -> usize {
        self.skipped_blank + self.skipped_short + self.skipped_malformed
    }
}

#[derive(Debug)]
pub struct Blocklist {
    pub index: LshIndex,
    pub stats: BlocklistStats,
}

pub struct BlocklistOptions<'a> {
    pub content_key: &'a str,
    pub min_tokens: usize,
}

pub fn load_blocklist(
    path: &Path,
    options: &BlocklistOptions,
    shingler: &Shingler,
    hasher: &MinHasher,
    params: LshParams,
) -> Result<Blocklist, Error> {
    if !path.is_file() {
        return Err(ScrubError::BlocklistMissing(path.to_path_buf()).into());
    }
    let start = Instant::now();
    let is_jsonl = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.contains(".jsonl"))
        .unwrap_or(false);

    let mut stats = BlocklistStats::default();
    let mut texts: Vec<(EntryId, String)> = Vec::new();

    for (line_num, line) in LineReader::new(open_reader(path)?).enumerate() {
        stats.lines += 1;
        let line = match line? {
            RawLine::Text(line) => line,
            RawLine::Invalid => {
                stats.skipped_malformed += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            stats.skipped_blank += 1;
            continue;
        }

        let text = if is_jsonl {
            let parsed = serde_json::from_str::<Value>(&line)
                .map_err(Error::from)
                .and_then(|obj| get_nested_json_val(&obj, options.content_key).map(str::to_string));
            match parsed {
                Ok(text) => text,
                Err(e) => {
                    debug!(line = line_num, error = %e, "skipping malformed blocklist line");
                    stats.skipped_malformed += 1;
                    continue;
                }
            }
        } else {
            line
        };

        let tokens = shingler.token_count(&text);
        if tokens == 0 {
            stats.skipped_blank += 1;
            continue;
        }
        if tokens < options.min_tokens {
            stats.skipped_short += 1;
            continue;
        }
        texts.push((line_num, text));
    }

    let entries: Vec<BlocklistEntry> = texts
        .par_iter()
        .map(|(id, text)| BlocklistEntry {
            id: *id,
            signature: hasher.signature(&shingler.shingles(text)),
        })
        .collect();
    stats.indexed = entries.len();

    if entries.is_empty() {
        return Err(ScrubError::BlocklistEmpty {
            path: path.to_path_buf(),
            skipped: stats.skipped(),
        }
        .into());
    }

    let index = LshIndex::build(params, entries)?;
    info!(
        path = %path.display(),
        indexed = stats.indexed,
        skipped_short = stats.skipped_short,
        skipped_blank = stats.skipped_blank,
        skipped_malformed = stats.skipped_malformed,
        buckets = index.num_buckets(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "built blocklist index"
    );

    Ok(Blocklist { index, stats })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shingle::Tokenizer;
    use std::fs;
    use tempfile::TempDir;

    const AIME: &str = "Find the sum of all integers n such that n^2 minus 4 is a perfect square";

    fn load(path: &Path, min_tokens: usize) -> Result<Blocklist> {
        let shingler = Shingler::new(3, Tokenizer::Whitespace, "");
        let hasher = MinHasher::new(128, 0);
        let params = LshParams::new(128, 32, 4)?;
        let options = BlocklistOptions {
            content_key: "problem",
            min_tokens,
        };
        load_blocklist(path, &options, &shingler, &hasher, params)
    }

    #[test]
    fn test_short_lines_are_filtered() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("ref.txt");
        fs::write(&path, format!("{}\n\nshort line\n   \nsolve for x now please\n", AIME))?;

        let blocklist = load(&path, 4)?;
        assert_eq!(
            blocklist.stats,
            BlocklistStats {
                lines: 5,
                indexed: 2,
                skipped_blank: 2,
                skipped_short: 1,
                skipped_malformed: 0,
            }
        );
        assert_eq!(blocklist.index.len(), 2);

        // With the filter off the short line is indexed too.
        let unfiltered = load(&path, 0)?;
        assert_eq!(unfiltered.stats.indexed, 3);
        Ok(())
    }

    #[test]
    fn test_missing_blocklist_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.txt"), 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrubError>(),
            Some(ScrubError::BlocklistMissing(_))
        ));
    }

    #[test]
    fn test_empty_blocklist_is_fatal() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("ref.txt");
        fs::write(&path, "\n\ntoo short\n")?;
        let err = load(&path, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrubError>(),
            Some(ScrubError::BlocklistEmpty { skipped: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_jsonl_blocklist_reads_content_key() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("ref.jsonl");
        fs::write(
            &path,
            format!("{{\"problem\": \"{}\"}}\nnot json\n{{\"answer\": 3}}\n", AIME),
        )?;
        let blocklist = load(&path, 4)?;
        assert_eq!(blocklist.stats.indexed, 1);
        assert_eq!(blocklist.stats.skipped_malformed, 2);
        Ok(())
    }
}

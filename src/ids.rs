// `add-ids`: give every record a stable identifier derived from its file name
// and physical line number. Uses the same staged rewrite as scrubbing, so an
// interrupted run never leaves a half-written corpus file behind.

use anyhow::{Context, Error, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{error, info};

use crate::args::AddIdsArgs;
use crate::atomic::AtomicRewrite;
use crate::io::{expand_corpus_paths, open_reader, LineReader, RawLine};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdReport {
    pub rows_written: usize,
    pub ids_added: usize,
    pub malformed: usize,
}

/// `data/logic_core.jsonl.gz` -> `logic_core`
pub fn id_prefix(path: &Path) -> String {
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");

    if let Some(pos) = filename.find(".jsonl") {
        filename[..pos].to_string()
    } else {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }
}

pub fn add_ids_to_file(path: &Path, id_key: &str) -> Result<IdReport, Error> {
    let prefix = id_prefix(path);
    let mut report = IdReport::default();
    let mut output = AtomicRewrite::begin(path)?;

    for (line_num, line) in LineReader::new(open_reader(path)?).enumerate() {
        let line = match line? {
            RawLine::Text(line) => line,
            RawLine::Invalid => {
                report.malformed += 1;
                continue;
            }
        };
        let mut row: Value = match serde_json::from_str(&line) {
            Ok(row) => row,
            Err(_) => {
                if !line.trim().is_empty() {
                    report.malformed += 1;
                }
                continue;
            }
        };
        let Some(obj) = row.as_object_mut() else {
            report.malformed += 1;
            continue;
        };

        if obj.contains_key(id_key) {
            output.write_line(&line)?;
        } else {
            obj.insert(
                id_key.to_string(),
                Value::String(format!("{}_{}", prefix, line_num)),
            );
            output.write_line(&serde_json::to_string(&row)?)?;
            report.ids_added += 1;
        }
        report.rows_written += 1;
    }

    output.finish()?.commit()?;
    Ok(report)
}

pub fn execute_add_ids(args: &AddIdsArgs) -> Result<Vec<(String, IdReport)>, Error> {
    let files = expand_corpus_paths(&args.input)?;
    let mut reports = Vec::with_capacity(files.len());
    let mut failed = 0;

    for path in &files {
        match add_ids_to_file(path, &args.id_key).with_context(|| format!("adding ids to {:?}", path)) {
            Ok(report) => {
                info!(
                    file = %path.display(),
                    rows = report.rows_written,
                    ids_added = report.ids_added,
                    malformed = report.malformed,
                    "updated file"
                );
                println!("-> Updated {} rows in {}", report.rows_written, path.display());
                reports.push((path.display().to_string(), report));
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                error!(error = %reason, "add-ids failed, original left untouched");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, files.len());
    }
    Ok(reports)
}

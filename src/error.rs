use std::path::PathBuf;

/// Failures that callers need to tell apart. Everything else travels as a
/// plain `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum ScrubError {
    #[error("invalid LSH parameters: num_perm={num_perm}, bands={bands}, rows={rows} (bands * rows must equal num_perm)")]
    InvalidLshParams {
        num_perm: usize,
        bands: usize,
        rows: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("blocklist file not found: {0:?}")]
    BlocklistMissing(PathBuf),

    #[error("blocklist {path:?} has no indexable entries ({skipped} lines skipped)")]
    BlocklistEmpty { path: PathBuf, skipped: usize },

    #[error("no corpus files found under {0:?}")]
    NoCorpusFiles(PathBuf),

    #[error("signature has {got} values, index expects {expected}")]
    SignatureLength { expected: usize, got: usize },

    #[error("{failed} of {total} files failed to scrub")]
    FilesFailed { failed: usize, total: usize },
}

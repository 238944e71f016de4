use clap::Args;
use std::path::PathBuf;

/// Every field overrides the matching key of the YAML config when set.
#[derive(Args, Debug, Clone, Default)]
pub struct ScrubArgs {
    #[arg(long, help = "YAML config file; flags below override its values")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Reference text (one problem per line) or .jsonl file of banned problems")]
    pub blocklist: Option<PathBuf>,

    #[arg(long, help = "Corpus file or directory of .jsonl[.gz|.zst] files to scrub in place")]
    pub input: Option<PathBuf>,

    #[arg(long, help = "JSON field holding the problem text (dotted paths allowed)")]
    pub content_key: Option<String>,

    #[arg(long)]
    pub num_perm: Option<usize>,

    #[arg(long, help = "Number of LSH bands (b)")]
    pub num_bands: Option<usize>,

    #[arg(long, help = "Rows per LSH band (r)")]
    pub band_size: Option<usize>,

    #[arg(long, help = "Target Jaccard similarity; picks bands/rows when they are not given")]
    pub threshold: Option<f64>,

    #[arg(long, help = "Tokens per shingle (k)")]
    pub ngram_size: Option<usize>,

    #[arg(long, help = "Blocklist lines with fewer tokens are not indexed")]
    pub min_blocklist_tokens: Option<usize>,

    #[arg(long = "keyword", help = "Exact substring that always drops a record; repeat to replace the configured list")]
    pub keywords: Vec<String>,

    #[arg(long)]
    pub hash_seed: Option<u64>,

    #[arg(long, help = "Only drop LSH candidates whose estimated similarity reaches the threshold")]
    pub verify_similarity: bool,

    #[arg(long, help = "Report what would be removed without replacing any file")]
    pub dry_run: bool,

    #[arg(long, help = "Write a JSONL report of removed records to this directory")]
    pub report_output_dir: Option<PathBuf>,

    #[arg(long, help = "Records decided in parallel per batch")]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct AddIdsArgs {
    #[arg(required = true, help = "Corpus file or directory")]
    pub input: PathBuf,

    #[arg(long, default_value = "id")]
    pub id_key: String,
}

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use mathscrub::args::{AddIdsArgs, ScrubArgs};
use mathscrub::{execute_add_ids, execute_scrub};

/*=================================================================
=                                  ARGS                           =
=================================================================*/

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct ArgParser {
    #[clap(subcommand)]
    command: Commands,

    #[arg(long, default_value_t = 0, help = "Worker threads (0 = one per core)")]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Remove blocklisted and near-duplicate problems from corpus files in place
    Scrub(ScrubArgs),

    /// Add `{file_stem}_{line}` ids to records that lack one
    AddIds(AddIdsArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let args = ArgParser::parse();
    if args.threads != 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(args.threads)
            .build_global()
        {
            error!(error = %e, "could not size the thread pool");
        }
    }

    let result = match &args.command {
        Commands::Scrub(scrub_args) => execute_scrub(scrub_args).map(|_| ()),
        Commands::AddIds(add_ids_args) => execute_add_ids(add_ids_args).map(|_| ()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

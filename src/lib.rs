//! # Warning: Unstable API
//!
//! This library API is unstable and subject to breaking changes without notice.
//! Only the CLI interface is considered stable. Use at your own risk.
//!
//! `mathscrub` removes benchmark-contaminated records from math training
//! corpora: a blocklist of held-out problems is indexed once with MinHash and
//! banded LSH, corpus files are streamed against it, and the survivors
//! atomically replace each file.

// Mark everything as doc(hidden) to avoid exposing unstable API in docs
#[doc(hidden)]
pub mod args;
#[doc(hidden)]
pub mod atomic;
#[doc(hidden)]
pub mod blocklist;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod error;
#[doc(hidden)]
pub mod ids;
#[doc(hidden)]
pub mod io;
#[doc(hidden)]
pub mod keywords;
#[doc(hidden)]
pub mod lsh;
#[doc(hidden)]
pub mod minhash;
#[doc(hidden)]
pub mod scrub;
#[doc(hidden)]
pub mod shingle;

// Re-exports for convenience (also hidden from docs)
#[doc(hidden)]
pub use config::Config;
#[doc(hidden)]
pub use error::ScrubError;
#[doc(hidden)]
pub use ids::execute_add_ids;
#[doc(hidden)]
pub use lsh::{LshIndex, LshParams};
#[doc(hidden)]
pub use minhash::{MinHasher, Signature};
#[doc(hidden)]
pub use scrub::{execute_scrub, ScrubEngine, Verdict};
#[doc(hidden)]
pub use shingle::Shingler;

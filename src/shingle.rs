// Text normalization and k-token shingling.
//
// Both the blocklist and the corpus go through the same `Shingler`, so any
// change to normalization changes every signature produced in a run.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

pub type ShingleSet = HashSet<String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tokenizer {
    /// Split on Unicode whitespace.
    #[default]
    Whitespace,
    /// Unicode word boundaries (UAX #29), punctuation dropped.
    Uniseg,
}

#[derive(Debug, Clone)]
pub struct Shingler {
    ngram_size: usize,
    tokenizer: Tokenizer,
    punctuation: Vec<char>,
}

impl Shingler {
    pub fn new(ngram_size: usize, tokenizer: Tokenizer, punctuation_chars: &str) -> Self {
        Shingler {
            ngram_size: ngram_size.max(1),
            tokenizer,
            punctuation: punctuation_chars.chars().collect(),
        }
    }

    pub fn ngram_size(&self) -> usize {
        self.ngram_size
    }

    /// Lower-case, drop configured punctuation, collapse runs of whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let mut lowered = text.to_lowercase();
        if !self.punctuation.is_empty() {
            lowered.retain(|c| !self.punctuation.contains(&c));
        }
        lowered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn tokenize<'a>(&self, normalized: &'a str) -> Vec<&'a str> {
        match self.tokenizer {
            Tokenizer::Whitespace => normalized.split_whitespace().collect(),
            Tokenizer::Uniseg => normalized.unicode_words().collect(),
        }
    }

    pub fn token_count(&self, text: &str) -> usize {
        self.tokenize(&self.normalize(text)).len()
    }

    /// All distinct k-token windows of the normalized text. Text shorter than
    /// k tokens becomes a single shingle; text with no tokens yields an empty
    /// set, which callers must never index or query.
    pub fn shingles(&self, text: &str) -> ShingleSet {
        self.shingles_of_normalized(&self.normalize(text))
    }

    /// Same as `shingles` for text that already went through `normalize`.
    pub fn shingles_of_normalized(&self, normalized: &str) -> ShingleSet {
        let tokens = self.tokenize(normalized);

        if tokens.is_empty() {
            return ShingleSet::new();
        }
        if tokens.len() < self.ngram_size {
            let mut set = ShingleSet::with_capacity(1);
            set.insert(tokens.join(" "));
            return set;
        }

        tokens
            .windows(self.ngram_size)
            .map(|window| window.join(" "))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shingler(k: usize) -> Shingler {
        Shingler::new(k, Tokenizer::Whitespace, "")
    }

    #[test]
    fn test_sliding_windows() {
        let set = shingler(3).shingles("The quick brown fox jumps");
        let mut got: Vec<_> = set.into_iter().collect();
        got.sort();
        assert_eq!(got, vec!["brown fox jumps", "quick brown fox", "the quick brown"]);
    }

    #[test]
    fn test_repeated_windows_are_deduplicated() {
        let set = shingler(2).shingles("a b a b a b");
        assert_eq!(set.len(), 2);
        assert!(set.contains("a b"));
        assert!(set.contains("b a"));
    }

    #[test]
    fn test_short_text_falls_back_to_whole_text() {
        let set = shingler(3).shingles("  Compute   2+2 ");
        assert_eq!(set.len(), 1);
        assert!(set.contains("compute 2+2"));
    }

    #[test]
    fn test_empty_text_yields_empty_set() {
        assert!(shingler(3).shingles("").is_empty());
        assert!(shingler(3).shingles(" \t\n ").is_empty());
    }

    #[test]
    fn test_normalization_is_case_and_space_insensitive() {
        let s = shingler(3);
        assert_eq!(
            s.shingles("Find THE sum of\tall integers"),
            s.shingles("find the sum   of all integers")
        );
    }

    #[test]
    fn test_punctuation_stripping() {
        let s = Shingler::new(3, Tokenizer::Whitespace, ",.?");
        assert_eq!(s.normalize("Hello, world. How are you?"), "hello world how are you");
        assert_eq!(s.token_count("Hello, world. How are you?"), 5);
    }

    #[test]
    fn test_uniseg_tokenizer_drops_punctuation_tokens() {
        let s = Shingler::new(2, Tokenizer::Uniseg, "");
        let set = s.shingles("Janet's ducks, lay eggs!");
        assert!(set.contains("janet's ducks"));
        assert!(set.contains("lay eggs"));
        assert_eq!(set.len(), 3);
    }
}

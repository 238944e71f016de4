// Exact-substring safety belt. Catches short, highly specific leaks (named
// benchmark + year) that share too few shingles to collide in the LSH index.

use aho_corasick::{AhoCorasick, MatchKind};
use anyhow::{Error, Result};

use crate::shingle::Shingler;

#[derive(Debug, Clone)]
pub struct KeywordBelt {
    keywords: Vec<String>,
    matcher: Option<AhoCorasick>,
}

impl KeywordBelt {
    /// Keywords are normalized with the same `Shingler` as record text so that
    /// case and spacing never decide a match. Keywords that normalize to
    /// nothing are ignored, since an empty pattern matches every record.
    pub fn new(keywords: &[String], shingler: &Shingler) -> Result<Self, Error> {
        let (keywords, patterns): (Vec<String>, Vec<String>) = keywords
            .iter()
            .map(|k| (k.clone(), shingler.normalize(k)))
            .filter(|(_, pattern)| !pattern.is_empty())
            .unzip();

        let matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&patterns)?,
            )
        };

        Ok(KeywordBelt { keywords, matcher })
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// The configured keyword found in already-normalized text, if any.
    pub fn find(&self, normalized: &str) -> Option<&str> {
        let matcher = self.matcher.as_ref()?;
        matcher
            .find(normalized)
            .map(|m| self.keywords[m.pattern().as_usize()].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shingle::Tokenizer;

    fn belt(keywords: &[&str]) -> (KeywordBelt, Shingler) {
        let shingler = Shingler::new(3, Tokenizer::Whitespace, "");
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        (KeywordBelt::new(&keywords, &shingler).unwrap(), shingler)
    }

    #[test]
    fn test_match_ignores_case_and_spacing() {
        let (belt, shingler) = belt(&["AIME 2024"]);
        let text = shingler.normalize("From the   aime\t2024 contest: find x.");
        assert_eq!(belt.find(&text), Some("AIME 2024"));
    }

    #[test]
    fn test_no_match() {
        let (belt, shingler) = belt(&["AIME 2024", "AMC 2023"]);
        assert_eq!(belt.find(&shingler.normalize("AIME 2019 problem 3")), None);
    }

    #[test]
    fn test_empty_belt_never_matches() {
        let (belt, shingler) = belt(&["", "   "]);
        assert!(belt.is_empty());
        assert_eq!(belt.find(&shingler.normalize("aime 2024")), None);
    }

    #[test]
    fn test_leftmost_keyword_is_reported() {
        let (belt, shingler) = belt(&["AIME 2025", "AMC 2023"]);
        assert_eq!(belt.len(), 2);
        let text = shingler.normalize("amc 2023 then aime 2025");
        assert_eq!(belt.find(&text), Some("AMC 2023"));
    }

    #[test]
    fn test_keyword_of_only_punctuation_is_dropped() {
        let shingler = Shingler::new(3, Tokenizer::Whitespace, "!");
        let keywords = vec!["!!".to_string(), "AIME 2024!".to_string()];
        let belt = KeywordBelt::new(&keywords, &shingler).unwrap();
        assert_eq!(belt.len(), 1);
        assert_eq!(belt.find(&shingler.normalize("Compute 2+2")), None);
        assert_eq!(
            belt.find(&shingler.normalize("From AIME 2024: compute x")),
            Some("AIME 2024!")
        );
    }
}

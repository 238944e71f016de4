// Banded LSH index over MinHash signatures.
//
// A signature of `num_perm` values is cut into `bands` contiguous bands of
// `rows` values. Two signatures become candidates when they agree on every
// value of at least one band. The index is built once from the blocklist and
// is read-only afterwards, so it can be shared across threads by reference.

use ahash::AHashMap;
use ndarray::ArrayView1;
use sha2::{Digest, Sha256};

use crate::error::ScrubError;
use crate::minhash::Signature;

pub type EntryId = usize;

// Recall floor used when picking bands/rows from a similarity threshold.
const MIN_RECALL: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    num_perm: usize,
    bands: usize,
    rows: usize,
}

impl LshParams {
    pub fn new(num_perm: usize, bands: usize, rows: usize) -> Result<Self, ScrubError> {
        if num_perm == 0 || bands == 0 || rows == 0 || bands * rows != num_perm {
            return Err(ScrubError::InvalidLshParams {
                num_perm,
                bands,
                rows,
            });
        }
        Ok(LshParams {
            num_perm,
            bands,
            rows,
        })
    }

    /// Pick the most selective band split whose probability of catching a
    /// pair at exactly `threshold` similarity is still at least 0.9. Falls
    /// back to the split with the best probability when none reaches it.
    pub fn for_threshold(num_perm: usize, threshold: f64) -> Result<Self, ScrubError> {
        if num_perm == 0 {
            return Err(ScrubError::InvalidLshParams {
                num_perm,
                bands: 0,
                rows: 0,
            });
        }

        let candidates: Vec<LshParams> = (1..=num_perm)
            .filter(|rows| num_perm % rows == 0)
            .map(|rows| LshParams {
                num_perm,
                bands: num_perm / rows,
                rows,
            })
            .collect();

        let selective = candidates
            .iter()
            .filter(|p| p.collision_probability(threshold) >= MIN_RECALL)
            .max_by_key(|p| p.rows);
        if let Some(params) = selective {
            return Ok(*params);
        }

        candidates
            .into_iter()
            .max_by(|a, b| {
                a.collision_probability(threshold)
                    .total_cmp(&b.collision_probability(threshold))
            })
            .ok_or(ScrubError::InvalidLshParams {
                num_perm,
                bands: 0,
                rows: 0,
            })
    }

    pub fn num_perm(&self) -> usize {
        self.num_perm
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Probability that two signatures with Jaccard similarity `s` share at
    /// least one full band: 1 - (1 - s^r)^b.
    pub fn collision_probability(&self, similarity: f64) -> f64 {
        let s = similarity.clamp(0.0, 1.0);
        1.0 - (1.0 - s.powi(self.rows as i32)).powi(self.bands as i32)
    }

    /// Similarity where the S-curve is steepest, roughly (1/b)^(1/r).
    pub fn approx_threshold(&self) -> f64 {
        (1.0 / self.bands as f64).powf(1.0 / self.rows as f64)
    }
}

#[derive(Debug, Clone)]
pub struct BlocklistEntry {
    pub id: EntryId,
    pub signature: Signature,
}

#[derive(Debug)]
pub struct LshIndex {
    params: LshParams,
    // One bucket table per band: band hash -> entry ids
    buckets: Vec<AHashMap<u64, Vec<EntryId>>>,
    signatures: AHashMap<EntryId, Signature>,
}

impl LshIndex {
    pub fn build(
        params: LshParams,
        entries: impl IntoIterator<Item = BlocklistEntry>,
    ) -> Result<Self, ScrubError> {
        let mut buckets: Vec<AHashMap<u64, Vec<EntryId>>> =
            (0..params.bands).map(|_| AHashMap::new()).collect();
        let mut signatures = AHashMap::new();

        for entry in entries {
            check_len(&params, &entry.signature)?;
            for (band_idx, band) in entry
                .signature
                .values()
                .exact_chunks(params.rows)
                .into_iter()
                .enumerate()
            {
                buckets[band_idx]
                    .entry(band_hash(band))
                    .or_default()
                    .push(entry.id);
            }
            signatures.insert(entry.id, entry.signature);
        }

        Ok(LshIndex {
            params,
            buckets,
            signatures,
        })
    }

    pub fn params(&self) -> &LshParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    /// Sorted, de-duplicated ids of every entry sharing at least one band with
    /// `signature`. Non-empty means "likely duplicate", not a certified
    /// similarity bound.
    pub fn query(&self, signature: &Signature) -> Result<Vec<EntryId>, ScrubError> {
        check_len(&self.params, signature)?;

        let mut matches: Vec<EntryId> = Vec::new();
        for (band_idx, band) in signature
            .values()
            .exact_chunks(self.params.rows)
            .into_iter()
            .enumerate()
        {
            if let Some(ids) = self.buckets[band_idx].get(&band_hash(band)) {
                matches.extend_from_slice(ids);
            }
        }
        matches.sort_unstable();
        matches.dedup();
        Ok(matches)
    }

    /// Candidates paired with their estimated Jaccard similarity, most similar
    /// first.
    pub fn query_with_similarity(
        &self,
        signature: &Signature,
    ) -> Result<Vec<(EntryId, f64)>, ScrubError> {
        let mut scored: Vec<(EntryId, f64)> = self
            .query(signature)?
            .into_iter()
            .filter_map(|id| {
                self.signatures
                    .get(&id)
                    .map(|stored| (id, signature.jaccard(stored)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(scored)
    }
}

fn check_len(params: &LshParams, signature: &Signature) -> Result<(), ScrubError> {
    if signature.len() != params.num_perm {
        return Err(ScrubError::SignatureLength {
            expected: params.num_perm,
            got: signature.len(),
        });
    }
    Ok(())
}

fn band_hash(band: ArrayView1<'_, u64>) -> u64 {
    let mut hasher = Sha256::new();
    for value in band.iter() {
        hasher.update(value.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(buf)
}

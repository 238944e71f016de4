// MinHash signatures over shingle sets.
//
// Permutation i is the universal hash h -> (a_i * h + b_i) mod p with
// p = 2^61 - 1. The (a_i, b_i) table is drawn from a ChaCha20 stream seeded by
// `hash_seed`, and shingles are hashed with SHA-256, so signatures are stable
// across runs, machines and builds.

use ndarray::{Array1, ArrayView1, Zip};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::shingle::ShingleSet;

const MERSENNE_PRIME: u64 = (1 << 61) - 1;
const MAX_HASH: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Array1<u64>);

impl Signature {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> ArrayView1<'_, u64> {
        self.0.view()
    }

    /// Estimated Jaccard similarity: the fraction of positions that agree.
    pub fn jaccard(&self, other: &Signature) -> f64 {
        if self.len() != other.len() || self.is_empty() {
            return 0.0;
        }
        let matches = self
            .0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.len() as f64
    }
}

impl From<Vec<u64>> for Signature {
    fn from(values: Vec<u64>) -> Self {
        Signature(Array1::from_vec(values))
    }
}

#[derive(Debug, Clone)]
pub struct MinHasher {
    a: Array1<u64>,
    b: Array1<u64>,
}

impl MinHasher {
    pub fn new(num_perm: usize, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut a = Vec::with_capacity(num_perm);
        let mut b = Vec::with_capacity(num_perm);
        for _ in 0..num_perm {
            a.push(rng.gen_range(1..MERSENNE_PRIME));
            b.push(rng.gen_range(0..MERSENNE_PRIME));
        }
        MinHasher {
            a: Array1::from_vec(a),
            b: Array1::from_vec(b),
        }
    }

    pub fn num_perm(&self) -> usize {
        self.a.len()
    }

    /// An empty shingle set produces the all-`u64::MAX` signature; it is never
    /// meaningful to index or query it.
    pub fn signature(&self, shingles: &ShingleSet) -> Signature {
        let mut hash_vals = Array1::from_elem(self.num_perm(), MAX_HASH);
        for shingle in shingles {
            let h = shingle_hash(shingle) % MERSENNE_PRIME;
            Zip::from(&mut hash_vals)
                .and(&self.a)
                .and(&self.b)
                .for_each(|min, &a, &b| {
                    let v = permute(h, a, b);
                    if v < *min {
                        *min = v;
                    }
                });
        }
        Signature(hash_vals)
    }
}

fn permute(h: u64, a: u64, b: u64) -> u64 {
    ((a as u128 * h as u128 + b as u128) % MERSENNE_PRIME as u128) as u64
}

fn shingle_hash(shingle: &str) -> u64 {
    let digest = Sha256::digest(shingle.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shingle::{Shingler, Tokenizer};

    fn set_of(items: impl IntoIterator<Item = String>) -> ShingleSet {
        items.into_iter().collect()
    }

    #[test]
    fn test_signature_length_matches_num_perm() {
        let hasher = MinHasher::new(128, 0);
        let sig = hasher.signature(&set_of(vec!["a b c".to_string()]));
        assert_eq!(sig.len(), 128);
    }

    #[test]
    fn test_signature_is_deterministic() {
        let shingler = Shingler::new(3, Tokenizer::Whitespace, "");
        let text = "Find the sum of all integers n such that n^2 minus 4 is a perfect square";

        let first = MinHasher::new(128, 7).signature(&shingler.shingles(text));
        let second = MinHasher::new(128, 7).signature(&shingler.shingles(text));
        assert_eq!(first, second);

        let hasher = MinHasher::new(128, 7);
        assert_eq!(hasher.signature(&shingler.shingles(text)), first);
    }

    #[test]
    fn test_signature_values_are_pinned() {
        // Changing the shingle hash or the draw order of the permutation
        // table silently invalidates every stored signature.
        let hasher = MinHasher::new(128, 0);
        assert_eq!(&hasher.a.as_slice().unwrap()[..2], &[56184884464369399_u64, 1984800238806794743]);
        assert_eq!(&hasher.b.as_slice().unwrap()[..2], &[2264378569463407700_u64, 428484079295717030]);

        let shingler = Shingler::new(3, Tokenizer::Whitespace, "");
        let text = "Find the sum of all integers n such that n^2 minus 4 is a perfect square";
        let sig = hasher.signature(&shingler.shingles(text));
        assert_eq!(
            sig.values().iter().take(4).copied().collect::<Vec<u64>>(),
            vec![78701926425505709_u64, 458271661433546238, 105728686242779632, 69037706835237622]
        );
    }

    #[test]
    fn test_seed_changes_permutations() {
        let set = set_of((0..20).map(|i| format!("token {}", i)));
        let a = MinHasher::new(64, 1).signature(&set);
        let b = MinHasher::new(64, 2).signature(&set);
        assert_ne!(a, b);
    }

    #[test]
    fn test_identical_sets_have_similarity_one() {
        let hasher = MinHasher::new(128, 0);
        let set = set_of((0..30).map(|i| format!("s{}", i)));
        let sig = hasher.signature(&set);
        assert_eq!(sig.jaccard(&hasher.signature(&set.clone())), 1.0);
    }

    #[test]
    fn test_disjoint_sets_have_near_zero_similarity() {
        let hasher = MinHasher::new(128, 0);
        let left = hasher.signature(&set_of((0..50).map(|i| format!("left {}", i))));
        let right = hasher.signature(&set_of((0..50).map(|i| format!("right {}", i))));
        assert!(left.jaccard(&right) < 0.05);
    }

    #[test]
    fn test_similarity_estimates_jaccard() {
        // |A ∩ B| = 50, |A ∪ B| = 150, so J = 1/3.
        let hasher = MinHasher::new(256, 3);
        let a = hasher.signature(&set_of((0..100).map(|i| format!("x{}", i))));
        let b = hasher.signature(&set_of((50..150).map(|i| format!("x{}", i))));
        let estimate = a.jaccard(&b);
        assert!((estimate - 1.0 / 3.0).abs() < 0.15, "estimate was {}", estimate);
    }

    #[test]
    fn test_mismatched_lengths_compare_as_dissimilar() {
        let a = Signature::from(vec![1, 2, 3, 4]);
        let b = Signature::from(vec![1, 2, 3]);
        assert_eq!(a.jaccard(&b), 0.0);
    }
}

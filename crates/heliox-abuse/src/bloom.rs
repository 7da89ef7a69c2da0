use std::f64::consts::LN_2;

use sha2::{Digest, Sha256};

/// Immutable-after-build membership filter over block identifiers
///
/// Positive answers may be wrong, negative answers never are. There is no
/// removal: the filter is rebuilt from the rule set instead.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size for `expected_items` at `false_positive_rate`
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let n = expected_items.max(1) as f64;
        let p = false_positive_rate.clamp(1e-9, 0.5);

        let m = (-n * p.ln() / (LN_2 * LN_2)).ceil().max(64.0);
        let k = (m / n * LN_2).round().clamp(1.0, 32.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let num_bits = m as u64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let num_hashes = k as u32;

        let words = usize::try_from(num_bits.div_ceil(64)).unwrap_or(usize::MAX);
        Self {
            bits: vec![0; words],
            num_bits: words as u64 * 64,
            num_hashes,
        }
    }

    /// Filter containing every identifier in `items`
    pub fn from_items<'a>(
        items: impl IntoIterator<Item = &'a str>,
        expected_items: usize,
        false_positive_rate: f64,
    ) -> Self {
        let mut filter = Self::new(expected_items, false_positive_rate);
        for item in items {
            filter.insert(item);
        }
        filter
    }

    pub fn insert(&mut self, item: &str) {
        for index in self.indexes(item) {
            let (word, bit) = split(index);
            self.bits[word] |= 1 << bit;
        }
    }

    pub fn might_contain(&self, item: &str) -> bool {
        self.indexes(item).all(|index| {
            let (word, bit) = split(index);
            self.bits[word] & (1 << bit) != 0
        })
    }

    pub const fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub const fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Double hashing over the two halves of one SHA-256 digest
    fn indexes(&self, item: &str) -> impl Iterator<Item = u64> + use<> {
        let digest = Sha256::digest(item.as_bytes());
        let mut h1 = [0u8; 8];
        let mut h2 = [0u8; 8];
        h1.copy_from_slice(&digest[..8]);
        h2.copy_from_slice(&digest[8..16]);
        let h1 = u64::from_le_bytes(h1);
        let h2 = u64::from_le_bytes(h2) | 1;
        let num_bits = self.num_bits;

        (0..u64::from(self.num_hashes)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % num_bits)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn split(index: u64) -> (usize, u64) {
    ((index / 64) as usize, index % 64)
}

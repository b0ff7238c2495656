//! Bloom filter for probabilistic set membership.
//!
//! A Bloom filter answers "definitely absent" or "maybe present". It is used
//! in front of the name index so lookups of names that were never added skip
//! the storage engine entirely.
//!
//! The filter hashes each item with two independently keyed 64-bit hashes and
//! derives the remaining probe positions by double hashing
//! (Kirsch–Mitzenmacher): `g_i(x) = h1(x) + i * h2(x) mod m`. Hashing cost is
//! two hashes per operation no matter how many probes are made.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use siphasher::sip::SipHasher13;

use eventum_common::error::{EventumError, EventumResult};

const KEY_1: (u64, u64) = (0x517c_c1b7_2722_0a95, 0x0fc9_4dc6_e6eb_8a5f);
const KEY_2: (u64, u64) = (0x9e37_79b9_7f4a_7c15, 0xbf58_476d_1ce4_e5b9);

/// A fixed-size Bloom filter safe to share between threads.
///
/// # Example
///
/// ```
/// use eventum_cache::bloom::BloomFilter;
///
/// let filter = BloomFilter::new(1000, 0.01).unwrap(); // 1% false positive rate
/// filter.add("$stream-1");
/// assert!(filter.may_exist("$stream-1")); // never a false negative
/// ```
pub struct BloomFilter {
    /// Bit array.
    bits: Vec<AtomicU64>,
    /// Number of bits, always a multiple of 64.
    num_bits: u64,
    /// Number of probes per item.
    num_hashes: u32,
    /// Number of items added.
    count: AtomicUsize,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at `false_positive_rate`.
    ///
    /// Uses `k = max(2, ceil(-log2(p)))` probes and
    /// `m = ceil(-n * log2(p) / ln(2))` bits rounded up to a whole 64-bit word.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `expected_items` is zero or
    /// `false_positive_rate` is outside the open interval (0, 0.5).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> EventumResult<Self> {
        if expected_items == 0 {
            return Err(EventumError::invalid_argument(
                "bloom filter needs a positive expected item count",
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 0.5) {
            return Err(EventumError::invalid_argument(format!(
                "bloom filter false positive rate {false_positive_rate} must be within (0, 0.5)"
            )));
        }

        let log2_p = false_positive_rate.log2();
        let num_hashes = ((-log2_p).ceil() as u32).max(2);
        let m = (-(expected_items as f64) * log2_p / std::f64::consts::LN_2).ceil() as u64;
        let num_words = m.max(1).div_ceil(64);

        Ok(Self {
            bits: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
            num_bits: num_words * 64,
            num_hashes,
            count: AtomicUsize::new(0),
        })
    }

    /// Adds an item.
    pub fn add<T: Hash + ?Sized>(&self, item: &T) {
        let (h1, h2) = Self::hash_pair(item);
        for i in 0..u64::from(self.num_hashes) {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 64) as usize].fetch_or(1u64 << (bit % 64), Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns false if the item was definitely never added.
    #[must_use]
    pub fn may_exist<T: Hash + ?Sized>(&self, item: &T) -> bool {
        let (h1, h2) = Self::hash_pair(item);
        (0..u64::from(self.num_hashes)).all(|i| {
            let bit = self.probe(h1, h2, i);
            self.bits[(bit / 64) as usize].load(Ordering::Relaxed) & (1u64 << (bit % 64)) != 0
        })
    }

    /// Returns the number of items added.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns the number of bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of probes per item.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Returns the size of the bit array in bytes.
    pub fn size_bytes(&self) -> usize {
        self.bits.len() * std::mem::size_of::<u64>()
    }

    /// Returns the fill ratio (fraction of bits set).
    pub fn fill_ratio(&self) -> f64 {
        self.count_ones() as f64 / self.num_bits as f64
    }

    /// Returns the false positive rate implied by the current fill.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        self.fill_ratio().powi(self.num_hashes as i32)
    }

    /// Clears the filter.
    pub fn clear(&self) {
        for word in &self.bits {
            word.store(0, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Relaxed);
    }

    fn hash_pair<T: Hash + ?Sized>(item: &T) -> (u64, u64) {
        let mut first = SipHasher13::new_with_keys(KEY_1.0, KEY_1.1);
        item.hash(&mut first);
        let mut second = SipHasher13::new_with_keys(KEY_2.0, KEY_2.1);
        item.hash(&mut second);
        // An odd step visits distinct positions for every probe.
        (first.finish(), second.finish() | 1)
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, i: u64) -> u64 {
        h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits
    }

    fn count_ones(&self) -> u64 {
        self.bits
            .iter()
            .map(|w| u64::from(w.load(Ordering::Relaxed).count_ones()))
            .sum()
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("count", &self.count())
            .field("fill_ratio", &format!("{:.2}%", self.fill_ratio() * 100.0))
            .finish()
    }
}

use crate::bit_vec::BitVec;
use crate::error::{Error, Result};
use crate::hash_provider::{hk, HashProvider, SipHashProvider};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A space-efficient probabilistic data structure to test for membership in a set.
///
/// At its core, a bloom filter is a bit array, initially all set to zero. `k` hash functions
/// map each key to `k` bits in the bit array. A key definitely does not exist in the bloom
/// filter if any of the `k` bits are unset. A key is possibly in the set if all of the `k` bits
/// are set.
///
/// Unlike the rest of the filters in this crate, `BloomFilter` never retains inserted keys or
/// their fingerprints, only the bit vector. `n`, the number of `insert` calls, counts
/// duplicates: inserting the same key twice increments `n` twice even though the bit vector is
/// unchanged the second time. This means `expected_fpr` can overestimate the true false
/// positive rate when duplicates are common; see the crate-level docs for why this isn't
/// corrected.
///
/// # Examples
///
/// ```
/// use cbcf_filters::bloom::BloomFilter;
///
/// let mut filter = BloomFilter::new(1000, 12).unwrap();
///
/// assert!(!filter.lookup(b"HO"));
/// filter.insert(b"HI");
/// assert!(filter.lookup(b"HI"));
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct BloomFilter<H = SipHashProvider> {
    bits: BitVec,
    k: usize,
    n: u64,
    hash_provider: H,
}

impl BloomFilter<SipHashProvider> {
    /// Constructs a new, empty `BloomFilter` with `m` bits and `k` hash functions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `m < 1` or `k < 1`. No state is allocated in that
    /// case.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::bloom::BloomFilter;
    ///
    /// let filter = BloomFilter::new(1000, 12).unwrap();
    /// assert!(BloomFilter::new(0, 12).is_err());
    /// ```
    pub fn new(m: usize, k: usize) -> Result<Self> {
        Self::with_hash_provider(m, k, SipHashProvider)
    }
}

impl<H> BloomFilter<H>
where
    H: HashProvider,
{
    /// Constructs a new, empty `BloomFilter` with `m` bits, `k` hash functions, and an explicit
    /// [`HashProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `m < 1` or `k < 1`.
    pub fn with_hash_provider(m: usize, k: usize, hash_provider: H) -> Result<Self> {
        if m < 1 {
            return Err(Error::InvalidArgument {
                message: "m must be at least 1".to_string(),
            });
        }
        if k < 1 {
            return Err(Error::InvalidArgument {
                message: "k must be at least 1".to_string(),
            });
        }
        Ok(BloomFilter {
            bits: BitVec::new(m),
            k,
            n: 0,
            hash_provider,
        })
    }

    /// Inserts `key` into the bloom filter.
    ///
    /// For each `i` in `0..k`, sets the bit at `Hk(key, i) mod m`. `n` is incremented
    /// unconditionally, even if every probed bit was already set.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::bloom::BloomFilter;
    ///
    /// let mut filter = BloomFilter::new(1000, 12).unwrap();
    /// filter.insert(b"HI");
    /// ```
    pub fn insert(&mut self, key: &[u8]) {
        let m = self.bits.len() as u64;
        for i in 0..self.k as u32 {
            let offset = u64::from(hk(&self.hash_provider, key, i)) % m;
            self.bits.set(offset as usize, true);
        }
        self.n += 1;
    }

    /// Returns `true` if `key` is possibly in the bloom filter, `false` if it is definitely not.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::bloom::BloomFilter;
    ///
    /// let mut filter = BloomFilter::new(1000, 12).unwrap();
    /// filter.insert(b"HI");
    /// assert!(filter.lookup(b"HI"));
    /// ```
    pub fn lookup(&self, key: &[u8]) -> bool {
        let m = self.bits.len() as u64;
        (0..self.k as u32).all(|i| {
            let offset = u64::from(hk(&self.hash_provider, key, i)) % m;
            self.bits.get(offset as usize) == Some(true)
        })
    }

    /// Returns the bit at index `i`. A debug accessor for inspecting the underlying bit vector
    /// directly.
    ///
    /// # Panics
    ///
    /// Panics if `i >= m`.
    pub fn bit_at(&self, i: usize) -> bool {
        self.bits.get(i).expect("index out of bounds")
    }

    /// Returns `(1 - (1 - 1/m)^(k*n))^k`, the expected false positive rate given the number of
    /// bits set so far by `n` insertions (counting duplicates).
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::bloom::BloomFilter;
    ///
    /// let filter = BloomFilter::new(1000, 12).unwrap();
    /// assert_eq!(filter.expected_fpr(), 0.0);
    /// ```
    pub fn expected_fpr(&self) -> f64 {
        let m = self.bits.len() as f64;
        let k = self.k as f64;
        let n = self.n as f64;
        (1.0 - (1.0 - 1.0 / m).powf(k * n)).powf(k)
    }

    /// Returns `m`, the number of bits in the underlying bit vector.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if `m == 0`. This can never happen for a filter constructed through
    /// [`BloomFilter::new`], which rejects `m < 1`.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Returns `k`, the number of hash functions used by the bloom filter.
    pub fn hasher_count(&self) -> usize {
        self.k
    }

    /// Returns `n`, the number of `insert` calls made so far (duplicates counted).
    pub fn insert_count(&self) -> u64 {
        self.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_sizing() {
        assert_eq!(
            BloomFilter::new(0, 12).unwrap_err(),
            Error::InvalidArgument {
                message: "m must be at least 1".to_string()
            }
        );
        assert_eq!(
            BloomFilter::new(1000, 0).unwrap_err(),
            Error::InvalidArgument {
                message: "k must be at least 1".to_string()
            }
        );
    }

    #[test]
    fn round_trip() {
        let mut filter = BloomFilter::new(1000, 12).unwrap();
        assert!(!filter.lookup(b"HI"));
        filter.insert(b"HI");
        assert!(filter.lookup(b"HI"));
        assert!(!filter.lookup(b"HO"));
    }

    #[test]
    fn no_false_negatives_over_range() {
        let mut filter = BloomFilter::new(100_000, 8).unwrap();
        for i in 0..2000 {
            filter.insert(i.to_string().as_bytes());
        }
        for i in 0..2000 {
            assert!(filter.lookup(i.to_string().as_bytes()));
        }
    }

    #[test]
    fn n_counts_duplicates() {
        let mut filter = BloomFilter::new(1000, 4).unwrap();
        filter.insert(b"foo");
        filter.insert(b"foo");
        assert_eq!(filter.insert_count(), 2);
    }

    #[test]
    fn expected_fpr_increases_with_insertions() {
        let mut filter = BloomFilter::new(1000, 4).unwrap();
        assert_eq!(filter.expected_fpr(), 0.0);
        filter.insert(b"foo");
        let after_one = filter.expected_fpr();
        assert!(after_one > 0.0);
        filter.insert(b"bar");
        assert!(filter.expected_fpr() > after_one);
    }

    #[test]
    fn bit_at_reflects_inserted_bits() {
        let mut filter = BloomFilter::new(64, 3).unwrap();
        filter.insert(b"key");
        let any_set = (0..64).any(|i| filter.bit_at(i));
        assert!(any_set);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_and_deserializes_with_bincode() {
        let mut filter = BloomFilter::new(1000, 12).unwrap();
        filter.insert(b"HI");

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: BloomFilter = bincode::deserialize(&serialized_filter).unwrap();

        assert!(de_filter.lookup(b"HI"));
        assert_eq!(de_filter.len(), filter.len());
        assert_eq!(de_filter.insert_count(), filter.insert_count());
    }
}

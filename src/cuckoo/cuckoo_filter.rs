use crate::error::{Error, Result};
use crate::hash_provider::{fingerprint, h1, h2, HashProvider, SipHashProvider};
use rand::Rng;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// A space-efficient probabilistic data structure to test for membership in a set. Unlike
/// [`BloomFilter`](crate::bloom::BloomFilter), cuckoo filters support removing items.
///
/// A cuckoo filter is a cuckoo hash table storing each key's fingerprint rather than the key
/// itself. Every key has two candidate buckets: `i1`, derived directly from the key, and `i2`,
/// derived from `i1` and the fingerprint. This is the "partial-key" cuckoo hashing scheme, where
/// the alternate bucket is computable from the fingerprint alone, without access to the original
/// key. When both candidate buckets are full, `insert` evicts a random fingerprint from one of
/// them and relocates it to *its* alternate bucket, retrying up to `max_kicks` times before
/// giving up.
///
/// `CuckooFilter` never retains the original keys, only their fingerprints. Two distinct keys
/// that hash to the same fingerprint and candidate buckets are indistinguishable once inserted.
///
/// # Examples
///
/// ```
/// use cbcf_filters::cuckoo::CuckooFilter;
///
/// let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
///
/// assert!(!filter.lookup(b"foo"));
/// assert!(filter.insert(b"foo"));
/// assert!(filter.lookup(b"foo"));
///
/// filter.delete(b"foo").unwrap();
/// assert!(!filter.lookup(b"foo"));
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
pub struct CuckooFilter<H = SipHashProvider> {
    buckets: Vec<Vec<u32>>,
    b: usize,
    f: u32,
    max_kicks: usize,
    n: usize,
    hash_provider: H,
    #[cfg_attr(feature = "serde", serde(skip, default = "XorShiftRng::from_entropy"))]
    rng: XorShiftRng,
}

impl CuckooFilter<SipHashProvider> {
    /// Constructs a new, empty `CuckooFilter` with `num_buckets` buckets, `bucket_len` slots per
    /// bucket, an `f`-bit fingerprint, and at most `max_kicks` eviction retries per `insert`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any of `num_buckets`, `bucket_len`, `f`, or
    /// `max_kicks` is less than 1, or if `f` is greater than 32.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CuckooFilter;
    ///
    /// let filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
    /// assert!(CuckooFilter::new(0, 4, 10, 10).is_err());
    /// ```
    pub fn new(num_buckets: usize, bucket_len: usize, f: u32, max_kicks: usize) -> Result<Self> {
        Self::with_hash_provider(num_buckets, bucket_len, f, max_kicks, SipHashProvider)
    }

    /// Like [`CuckooFilter::new`], but seeds the eviction RNG so `insert`'s random-walk
    /// eviction order is reproducible across runs. Intended for tests and benchmarks.
    pub fn with_seed(
        num_buckets: usize,
        bucket_len: usize,
        f: u32,
        max_kicks: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut filter = Self::new(num_buckets, bucket_len, f, max_kicks)?;
        filter.rng = XorShiftRng::seed_from_u64(seed);
        Ok(filter)
    }
}

impl<H> CuckooFilter<H>
where
    H: HashProvider,
{
    /// Constructs a new, empty `CuckooFilter` using the given [`HashProvider`] in place of the
    /// default [`SipHashProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any of `num_buckets`, `bucket_len`, `f`, or
    /// `max_kicks` is less than 1, or if `f` is greater than 32.
    pub fn with_hash_provider(
        num_buckets: usize,
        bucket_len: usize,
        f: u32,
        max_kicks: usize,
        hash_provider: H,
    ) -> Result<Self> {
        if num_buckets < 1 {
            return Err(Error::InvalidArgument {
                message: "num_buckets must be at least 1".to_string(),
            });
        }
        if bucket_len < 1 {
            return Err(Error::InvalidArgument {
                message: "bucket_len must be at least 1".to_string(),
            });
        }
        if f < 1 {
            return Err(Error::InvalidArgument {
                message: "f must be at least 1".to_string(),
            });
        }
        if f > 32 {
            return Err(Error::InvalidArgument {
                message: "f must be at most 32".to_string(),
            });
        }
        if max_kicks < 1 {
            return Err(Error::InvalidArgument {
                message: "max_kicks must be at least 1".to_string(),
            });
        }
        Ok(CuckooFilter {
            buckets: vec![Vec::with_capacity(bucket_len); num_buckets],
            b: bucket_len,
            f,
            max_kicks,
            n: 0,
            hash_provider,
            rng: XorShiftRng::from_entropy(),
        })
    }

    fn indexes(&self, key: &[u8], fp: u32) -> (usize, usize) {
        let num_buckets = self.buckets.len();
        let i1 = h1(&self.hash_provider, key) as usize % num_buckets;
        let i2 = (i1 ^ h2(&self.hash_provider, fp) as usize) % num_buckets;
        (i1, i2)
    }

    /// Inserts `key` into the filter.
    ///
    /// Returns `true` if the insert succeeded, `false` if eviction exhausted `max_kicks`. A
    /// failed insert is a soft failure: the filter is still left in a valid, queryable state,
    /// but the last fingerprint the random walk picked up is dropped rather than restored to
    /// its original bucket. Callers that see `false` should treat the filter as too full for
    /// its configured capacity rather than retry the same insert.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CuckooFilter;
    ///
    /// let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
    /// assert!(filter.insert(b"foo"));
    /// ```
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let mut fp = fingerprint(&self.hash_provider, key, self.f);
        let (i1, i2) = self.indexes(key, fp);

        if self.buckets[i1].len() < self.b {
            self.buckets[i1].push(fp);
            self.n += 1;
            return true;
        }
        if self.buckets[i2].len() < self.b {
            self.buckets[i2].push(fp);
            self.n += 1;
            return true;
        }

        let mut index = if self.rng.gen::<bool>() { i1 } else { i2 };
        for _ in 0..self.max_kicks {
            if self.buckets[index].len() < self.b {
                self.buckets[index].push(fp);
                self.n += 1;
                return true;
            }
            let victim_slot = self.rng.gen_range(0, self.buckets[index].len());
            let evicted = self.buckets[index][victim_slot];
            self.buckets[index][victim_slot] = fp;
            fp = evicted;
            index = (index ^ h2(&self.hash_provider, fp) as usize) % self.buckets.len();
        }
        false
    }

    /// Returns `true` if `key` is possibly in the filter, `false` if it is definitely not.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CuckooFilter;
    ///
    /// let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
    /// filter.insert(b"foo");
    /// assert!(filter.lookup(b"foo"));
    /// ```
    pub fn lookup(&self, key: &[u8]) -> bool {
        let fp = fingerprint(&self.hash_provider, key, self.f);
        let (i1, i2) = self.indexes(key, fp);
        self.buckets[i1].contains(&fp) || self.buckets[i2].contains(&fp)
    }

    /// Removes one occurrence of `key` from the filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `key`'s fingerprint is absent from both of its candidate
    /// buckets.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CuckooFilter;
    ///
    /// let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
    /// filter.insert(b"foo");
    /// filter.delete(b"foo").unwrap();
    /// assert!(!filter.lookup(b"foo"));
    /// ```
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let fp = fingerprint(&self.hash_provider, key, self.f);
        let (i1, i2) = self.indexes(key, fp);
        for i in [i1, i2] {
            if let Some(pos) = self.buckets[i].iter().position(|&stored| stored == fp) {
                self.buckets[i].remove(pos);
                self.n -= 1;
                return Ok(());
            }
        }
        Err(Error::NotFound)
    }

    /// Returns `8 * occupancy / 2^f`, the expected false positive rate.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CuckooFilter;
    ///
    /// let filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
    /// assert_eq!(filter.expected_fpr(), 0.0);
    /// ```
    pub fn expected_fpr(&self) -> f64 {
        8.0 * self.occupancy() / 2f64.powi(self.f as i32)
    }

    /// Returns `n / (B * b)`, the fraction of slots currently occupied.
    pub fn occupancy(&self) -> f64 {
        self.n as f64 / (self.buckets.len() * self.b) as f64
    }

    /// Returns `B`, the number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `b`, the number of slots per bucket.
    pub fn bucket_len(&self) -> usize {
        self.b
    }

    /// Returns `f`, the fingerprint bit width.
    pub fn fingerprint_bit_count(&self) -> u32 {
        self.f
    }

    /// Returns `n`, the total number of fingerprints currently stored.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` if the filter stores no fingerprints.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_sizing() {
        assert!(CuckooFilter::new(0, 4, 10, 10).is_err());
        assert!(CuckooFilter::new(500, 0, 10, 10).is_err());
        assert!(CuckooFilter::new(500, 4, 0, 10).is_err());
        assert!(CuckooFilter::new(500, 4, 33, 10).is_err());
        assert!(CuckooFilter::new(500, 4, 10, 0).is_err());
    }

    #[test]
    fn insert_and_lookup() {
        let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
        assert!(!filter.lookup(b"foo"));
        assert!(filter.insert(b"foo"));
        assert!(filter.lookup(b"foo"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn delete_removes_one_occurrence() {
        let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
        filter.insert(b"foo");
        filter.insert(b"foo");
        filter.delete(b"foo").unwrap();
        assert!(filter.lookup(b"foo"));
        filter.delete(b"foo").unwrap();
        assert!(!filter.lookup(b"foo"));
    }

    #[test]
    fn delete_missing_key_errors() {
        let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
        assert_eq!(filter.delete(b"missing").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn basic_insert_and_query_over_decimal_keys() {
        let mut filter = CuckooFilter::with_seed(500, 4, 10, 10, 42).unwrap();
        for i in 10_000..10_500 {
            assert!(filter.insert(i.to_string().as_bytes()));
        }
        for i in 10_000..10_500 {
            assert!(filter.lookup(i.to_string().as_bytes()));
        }

        let mut false_positives = 0;
        let queries = 4000;
        for i in 3000..(3000 + queries) {
            if filter.lookup(i.to_string().as_bytes()) {
                false_positives += 1;
            }
        }
        let observed_fpr = f64::from(false_positives) / f64::from(queries);
        // Generous bound relative to the analytic estimate; this is a smoke test, not a
        // statistical proof.
        assert!(observed_fpr <= filter.expected_fpr() * 4.0 + 0.01);
    }

    #[test]
    fn delete_leaves_remaining_keys_queryable() {
        let mut filter = CuckooFilter::with_seed(100, 4, 12, 10, 7).unwrap();
        for i in 0..300 {
            filter.insert(i.to_string().as_bytes());
        }
        for i in 0..200 {
            filter.delete(i.to_string().as_bytes()).unwrap();
        }
        for i in 200..300 {
            assert!(filter.lookup(i.to_string().as_bytes()));
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_and_deserializes_with_bincode() {
        let mut filter = CuckooFilter::new(500, 4, 10, 10).unwrap();
        filter.insert(b"foo");

        let serialized_filter = bincode::serialize(&filter).unwrap();
        let de_filter: CuckooFilter = bincode::deserialize(&serialized_filter).unwrap();

        assert!(de_filter.lookup(b"foo"));
        assert_eq!(de_filter.len(), filter.len());
    }

    #[test]
    fn occupancy_is_monotonic_under_insert_and_delete() {
        let mut filter = CuckooFilter::new(100, 4, 12, 10).unwrap();
        let mut prev = filter.occupancy();
        for i in 0..100 {
            filter.insert(i.to_string().as_bytes());
            let now = filter.occupancy();
            assert!(now >= prev);
            prev = now;
        }
        for i in 0..100 {
            filter.delete(i.to_string().as_bytes()).unwrap();
            let now = filter.occupancy();
            assert!(now <= prev);
            prev = now;
        }
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Property 1 (no false negatives): any key inserted without a later delete must
        // still be found by lookup, no matter how the eviction RNG shuffled other entries
        // around it.
        #[test]
        fn inserted_keys_are_always_found(keys in prop::collection::vec(any::<u64>(), 1..200)) {
            let mut filter = CuckooFilter::with_seed(200, 4, 12, 20, 99).unwrap();
            for key in &keys {
                filter.insert(&key.to_le_bytes());
            }
            for key in &keys {
                prop_assert!(filter.lookup(&key.to_le_bytes()));
            }
        }

        // Property 5: every stored fingerprint traces back to a bucket reachable from its
        // key via h1 or h1 xor h2(fingerprint).
        #[test]
        fn partial_key_invariant_holds(keys in prop::collection::vec(any::<u32>(), 1..150)) {
            let mut filter = CuckooFilter::with_seed(150, 4, 10, 20, 7).unwrap();
            for key in &keys {
                filter.insert(&key.to_le_bytes());
            }
            for (i, bucket) in filter.buckets.iter().enumerate() {
                for &fp in bucket {
                    let reachable = keys.iter().any(|key| {
                        let bytes = key.to_le_bytes();
                        let i1 = h1(&filter.hash_provider, &bytes) as usize % filter.buckets.len();
                        let i2 = (i1 ^ h2(&filter.hash_provider, fp) as usize) % filter.buckets.len();
                        i == i1 || i == i2
                    });
                    prop_assert!(reachable);
                }
            }
        }
    }
}

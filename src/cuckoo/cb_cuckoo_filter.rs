use crate::bit_vec::BitVec;
use crate::error::{Error, Result};
use crate::hash_provider::{fingerprint, h1, h2, HashProvider, SipHashProvider};
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Maximum cuckoo hops `scrub` will take while preferring a bucket with at least two free
/// slots, before falling back to the relaxed, potentially-refilling walk.
const SCRUB_CONSTRAINED_HOPS: usize = 20;

/// One occupied slot of a [`CBCuckooFilter`] bucket: the stored fingerprint alongside the
/// original key that produced it.
///
/// Keeping the fingerprint and its key in one struct, rather than two parallel `Vec`s, makes
/// `|buckets[i]| = |elems[i]|` true by construction instead of by caller discipline: every
/// mutation that touches one field touches the other.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(crate = "serde_crate")
)]
struct Slot {
    fingerprint: u32,
    key: Vec<u8>,
}

/// An extension of [`CuckooFilter`](crate::cuckoo::CuckooFilter) that stores a *longer*
/// fingerprint in buckets that still have room, and falls back to the standard short
/// fingerprint once a bucket fills, trading fingerprint width for occupancy to lower the false
/// positive rate at comparable space.
///
/// Each bucket carries a single bit, `s`, recording which width it currently holds:
///
/// - **Unfilled** (`s = true`): bucket has free slots; every stored fingerprint has the long
///   width `F = f + f / 3`.
/// - **Filled** (`s = false`): bucket is at capacity; every stored fingerprint has the short
///   width `f`.
///
/// Crossing the fullness boundary in either direction rewrites every fingerprint currently in
/// the bucket to the other width, which is why each slot also retains the original key: the
/// fingerprint can't be recomputed at a new width without it.
///
/// The alternate-bucket hash `h2` is always taken over the *short* fingerprint, regardless of
/// which width a bucket currently stores. This keeps the partial-key cuckoo invariant stable
/// across transitions; see the crate-level docs for why this matters.
///
/// # Examples
///
/// ```
/// use cbcf_filters::cuckoo::CBCuckooFilter;
///
/// let mut filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
///
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
pub struct CBCuckooFilter<H = SipHashProvider> {
    buckets: Vec<Vec<Slot>>,
    s: BitVec,
    b: usize,
    f: u32,
    long_f: u32,
    max_kicks: usize,
    n: usize,
    hash_provider: H,
    #[cfg_attr(feature = "serde", serde(skip, default = "XorShiftRng::from_entropy"))]
    rng: XorShiftRng,
}

/// Which width a bucket holds, and whether it's at capacity.
#[derive(Clone, Copy, PartialEq, Eq)]
enum BucketState {
    Unfilled,
    Filled,
}

impl CBCuckooFilter<SipHashProvider> {
    /// Constructs a new, empty `CBCuckooFilter` with `num_buckets` buckets, `bucket_len` slots
    /// per bucket, a short-fingerprint width of `f` bits (the long width is derived as
    /// `f + f / 3`), and at most `max_kicks` eviction retries per `insert`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any of `num_buckets`, `bucket_len`, `f`, or
    /// `max_kicks` is less than 1, or if `f + f / 3` (the long fingerprint width) is greater
    /// than 32.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// assert_eq!(filter.bucket_len(), 4);
    /// ```
    pub fn new(num_buckets: usize, bucket_len: usize, f: u32, max_kicks: usize) -> Result<Self> {
        Self::with_hash_provider(num_buckets, bucket_len, f, max_kicks, SipHashProvider)
    }

    /// Like [`CBCuckooFilter::new`], but seeds the eviction RNG for reproducible test runs.
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

impl<H> CBCuckooFilter<H>
where
    H: HashProvider,
{
    /// Constructs a new, empty `CBCuckooFilter` using the given [`HashProvider`] in place of
    /// the default [`SipHashProvider`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if any of `num_buckets`, `bucket_len`, `f`, or
    /// `max_kicks` is less than 1, or if `f + f / 3` (the long fingerprint width) is greater
    /// than 32.
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
        if f + f / 3 > 32 {
            return Err(Error::InvalidArgument {
                message: "f + f / 3 (the long fingerprint width) must be at most 32".to_string(),
            });
        }
        if max_kicks < 1 {
            return Err(Error::InvalidArgument {
                message: "max_kicks must be at least 1".to_string(),
            });
        }
        Ok(CBCuckooFilter {
            buckets: vec![Vec::with_capacity(bucket_len); num_buckets],
            s: BitVec::from_elem(num_buckets, true),
            b: bucket_len,
            f,
            long_f: f + f / 3,
            max_kicks,
            n: 0,
            hash_provider,
            rng: XorShiftRng::from_entropy(),
        })
    }

    fn state(&self, i: usize) -> BucketState {
        if self.s.get(i).expect("bucket index in range") {
            BucketState::Unfilled
        } else {
            BucketState::Filled
        }
    }

    fn indexes(&self, key: &[u8]) -> (usize, usize, u32, u32) {
        let num_buckets = self.buckets.len();
        let sfp = fingerprint(&self.hash_provider, key, self.f);
        let lfp = fingerprint(&self.hash_provider, key, self.long_f);
        let i1 = h1(&self.hash_provider, key) as usize % num_buckets;
        let i2 = (i1 ^ h2(&self.hash_provider, sfp) as usize) % num_buckets;
        (i1, i2, sfp, lfp)
    }

    /// Rewrites every slot in bucket `i` to the long fingerprint of its retained key and marks
    /// the bucket unfilled.
    fn transition_to_unfilled(&mut self, i: usize) {
        let long_f = self.long_f;
        let provider = &self.hash_provider;
        for slot in &mut self.buckets[i] {
            slot.fingerprint = fingerprint(provider, &slot.key, long_f);
        }
        self.s.set(i, true);
    }

    /// Rewrites every slot in bucket `i` to the short fingerprint of its retained key and marks
    /// the bucket filled.
    fn transition_to_filled(&mut self, i: usize) {
        let f = self.f;
        let provider = &self.hash_provider;
        for slot in &mut self.buckets[i] {
            slot.fingerprint = fingerprint(provider, &slot.key, f);
        }
        self.s.set(i, false);
    }

    /// Appends `(sfp/lfp, key)` to bucket `i`, performing the Unfilled→Filled transition if
    /// this insert is the one that fills the bucket.
    fn place(&mut self, i: usize, sfp: u32, lfp: u32, key: Vec<u8>) {
        if self.buckets[i].len() == self.b - 1 {
            self.transition_to_filled(i);
            self.buckets[i].push(Slot {
                fingerprint: sfp,
                key,
            });
        } else {
            self.buckets[i].push(Slot {
                fingerprint: lfp,
                key,
            });
        }
    }

    /// Inserts `key` into the filter.
    ///
    /// Returns `true` if the insert succeeded, `false` if eviction exhausted `max_kicks`. As
    /// with [`CuckooFilter::insert`](crate::cuckoo::CuckooFilter::insert), a failed insert
    /// still leaves the filter in a valid, queryable state: the last-evicted entry ends up
    /// sitting in a bucket, and the item it displaced is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let mut filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// assert!(filter.insert(b"foo"));
    /// ```
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let (i1, i2, sfp, lfp) = self.indexes(key);

        // Tie-break to i2 on equal bucket lengths, mirroring the reference `<` comparison.
        let t = if self.buckets[i1].len() < self.buckets[i2].len() {
            i1
        } else {
            i2
        };

        if self.buckets[t].len() < self.b {
            self.place(t, sfp, lfp, key.to_vec());
            self.n += 1;
            return true;
        }

        let mut e = if self.rng.gen::<bool>() { i1 } else { i2 };
        let mut sfp = sfp;
        let mut key = key.to_vec();
        for _ in 0..self.max_kicks {
            if self.buckets[e].len() < self.b {
                let lfp = fingerprint(&self.hash_provider, &key, self.long_f);
                self.place(e, sfp, lfp, key);
                self.n += 1;
                return true;
            }
            let evicted = self.buckets[e].pop().expect("full bucket is non-empty");
            self.buckets[e].push(Slot {
                fingerprint: sfp,
                key,
            });
            sfp = evicted.fingerprint;
            key = evicted.key;
            e = (e ^ h2(&self.hash_provider, sfp) as usize) % self.buckets.len();
        }
        false
    }

    /// Returns `true` if `key` is possibly in the filter, `false` if it is definitely not.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let mut filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// filter.insert(b"foo");
    /// assert!(filter.lookup(b"foo"));
    /// ```
    pub fn lookup(&self, key: &[u8]) -> bool {
        let (i1, i2, sfp, lfp) = self.indexes(key);
        [i1, i2].iter().any(|&i| {
            let probe = if self.state(i) == BucketState::Unfilled {
                lfp
            } else {
                sfp
            };
            self.buckets[i].iter().any(|slot| slot.fingerprint == probe)
        })
    }

    /// Removes `key` from the filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `key` is absent from both candidate buckets. A
    /// fingerprint match alone does not count. The retained key must also match, which is
    /// what distinguishes a true member from a fingerprint-collision false positive.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let mut filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// filter.insert(b"foo");
    /// filter.delete(b"foo").unwrap();
    /// assert!(!filter.lookup(b"foo"));
    /// ```
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let (i1, i2, sfp, lfp) = self.indexes(key);
        for i in [i1, i2] {
            let unfilled = self.state(i) == BucketState::Unfilled;
            let probe = if unfilled { lfp } else { sfp };
            let pos = self.buckets[i]
                .iter()
                .position(|slot| slot.fingerprint == probe && slot.key == key);
            if let Some(pos) = pos {
                self.buckets[i].remove(pos);
                self.n -= 1;
                if !unfilled {
                    self.transition_to_unfilled(i);
                }
                return Ok(());
            }
        }
        Err(Error::NotFound)
    }

    /// Maintenance operation: repacks full buckets to restore more of them to the
    /// unfilled/long-fingerprint state, lowering [`CBCuckooFilter::expected_fpr`] without
    /// changing the stored key set.
    ///
    /// For each bucket that is currently full, one element is popped out and the rest of the
    /// bucket is converted back to long fingerprints. The popped element is then relocated: a
    /// constrained walk of up to 20 cuckoo hops looks for a bucket with at least two free slots
    /// (so placing the element there can't immediately re-fill it); if that fails, an unbounded
    /// relaxed walk takes over and will accept a bucket with only one free slot, which may
    /// trigger that bucket's own Unfilled→Filled transition. The relaxed walk is capped at
    /// `10 * num_buckets` hops as an operational guard (the protocol itself has no formal
    /// bound here; see the crate-level docs).
    ///
    /// Does nothing and logs a warning if the filter is already completely full.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let mut filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// for i in 0..300 {
    ///     filter.insert(i.to_string().as_bytes());
    /// }
    /// for i in 0..200 {
    ///     filter.delete(i.to_string().as_bytes()).unwrap();
    /// }
    /// filter.scrub();
    /// ```
    pub fn scrub(&mut self) {
        let occupancy = self.occupancy();
        if occupancy >= 1.0 {
            tracing::warn!("scrub aborted: filter is full (occupancy = {})", occupancy);
            return;
        }
        if occupancy > 0.95 {
            tracing::warn!(
                "scrub called at high occupancy ({:.3}); this may be slow",
                occupancy
            );
        }

        let full_buckets: Vec<usize> = (0..self.buckets.len())
            .filter(|&i| self.state(i) == BucketState::Filled)
            .collect();

        for i in full_buckets {
            // Another bucket's relocation in this same scrub call may have already refilled
            // `i` again since we snapshotted `full_buckets`; skip it in that case.
            if self.state(i) != BucketState::Filled {
                continue;
            }
            let popped = self.buckets[i].pop().expect("full bucket is non-empty");
            self.transition_to_unfilled(i);
            self.relocate(i, popped);
        }
    }

    /// Walks the cuckoo graph starting from `slot`'s alternate bucket relative to `from` (the
    /// bucket it was just popped out of), first constrained then relaxed, and places it as soon
    /// as a suitable bucket is found.
    ///
    /// `from` must already be a reduced bucket index satisfying the partial-key invariant for
    /// `slot.key` (i.e. it is `i1` or `i2` as `indexes` would compute them). The alternate
    /// bucket is derived as `(from ^ h2(short fingerprint)) % num_buckets`, the same convention
    /// `indexes` and `insert` use, rather than XORing the unreduced `h1(key)` with `h2`.
    fn relocate(&mut self, from: usize, slot: Slot) {
        // `slot` was just popped out of a full bucket, so its fingerprint is already the short
        // width, exactly what h2 must hash to stay on the same partial-key cuckoo graph.
        let mut e =
            (from ^ h2(&self.hash_provider, slot.fingerprint) as usize) % self.buckets.len();

        for _ in 0..SCRUB_CONSTRAINED_HOPS {
            if self.buckets[e].len() < self.b.saturating_sub(1) {
                let lfp = fingerprint(&self.hash_provider, &slot.key, self.long_f);
                self.buckets[e].push(Slot {
                    fingerprint: lfp,
                    key: slot.key,
                });
                return;
            }
            e = (e ^ h2(&self.hash_provider, slot.fingerprint) as usize) % self.buckets.len();
        }

        let guard = 10 * self.buckets.len();
        for hop in 0..guard {
            if self.buckets[e].len() < self.b {
                let lfp = fingerprint(&self.hash_provider, &slot.key, self.long_f);
                self.place(e, slot.fingerprint, lfp, slot.key);
                return;
            }
            e = (e ^ h2(&self.hash_provider, slot.fingerprint) as usize) % self.buckets.len();
            if hop + 1 == guard {
                tracing::warn!(
                    "scrub relaxed walk exceeded {} hops relocating a slot; dropping it",
                    guard
                );
            }
        }
        // Guard exhausted: drop the slot rather than loop forever. This shrinks `n` by one
        // relative to the pre-scrub filter, which is out of scope for the formally-bounded
        // protocol (see the crate-level docs on scrub's relaxed phase).
        self.n -= 1;
    }

    /// Returns the expected false positive rate, combining the long- and short-fingerprint
    /// contributions weighted by how much of the filter's capacity each currently occupies.
    ///
    /// # Examples
    ///
    /// ```
    /// use cbcf_filters::cuckoo::CBCuckooFilter;
    ///
    /// let filter = CBCuckooFilter::new(100, 4, 12, 10).unwrap();
    /// assert_eq!(filter.expected_fpr(), 0.0);
    /// ```
    pub fn expected_fpr(&self) -> f64 {
        let full_buckets = (0..self.buckets.len())
            .filter(|&i| self.state(i) == BucketState::Filled)
            .count();
        let capacity = (self.buckets.len() * self.b) as f64;
        let shorts_count = (self.b * full_buckets) as f64;
        let s_frac = shorts_count / capacity;
        let l_frac = (self.n as f64 - shorts_count) / capacity;
        8.0 * (l_frac / 2f64.powi(self.long_f as i32) + s_frac / 2f64.powi(self.f as i32))
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

    /// Returns `f`, the short fingerprint bit width.
    pub fn fingerprint_bit_count(&self) -> u32 {
        self.f
    }

    /// Returns `F = f + f / 3`, the long fingerprint bit width.
    pub fn long_fingerprint_bit_count(&self) -> u32 {
        self.long_f
    }

    /// Returns `n`, the total number of keys currently stored.
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns `true` if the filter stores no keys.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Asserts every invariant from the crate-level design notes: bucket/elems length parity,
    /// the fingerprint-width-matches-state invariant, and the partial-key cuckoo invariant over
    /// the short fingerprint. Intended for tests and debug builds, not production hot paths:
    /// it's `O(n)` over the whole filter.
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message on the first invariant violation found.
    pub fn verify_state(&self) {
        for (i, bucket) in self.buckets.iter().enumerate() {
            match self.state(i) {
                BucketState::Unfilled => {
                    assert!(
                        bucket.len() < self.b,
                        "bucket {} marked unfilled but at capacity",
                        i
                    );
                    for slot in bucket {
                        let expected = fingerprint(&self.hash_provider, &slot.key, self.long_f);
                        assert_eq!(
                            slot.fingerprint, expected,
                            "bucket {} slot holds a fingerprint inconsistent with its long width",
                            i
                        );
                    }
                }
                BucketState::Filled => {
                    assert_eq!(
                        bucket.len(),
                        self.b,
                        "bucket {} marked filled but not at capacity",
                        i
                    );
                    for slot in bucket {
                        let expected = fingerprint(&self.hash_provider, &slot.key, self.f);
                        assert_eq!(
                            slot.fingerprint, expected,
                            "bucket {} slot holds a fingerprint inconsistent with its short width",
                            i
                        );
                    }
                }
            }
            for slot in bucket {
                let i1 = h1(&self.hash_provider, &slot.key) as usize % self.buckets.len();
                let sfp = fingerprint(&self.hash_provider, &slot.key, self.f);
                let i2 = (i1 ^ h2(&self.hash_provider, sfp) as usize) % self.buckets.len();
                assert!(
                    i == i1 || i == i2,
                    "slot for key {:?} found in bucket {} but partial-key invariant expects {} or {}",
                    slot.key,
                    i,
                    i1,
                    i2
                );
            }
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Properties 6-9 (all from _verify_state): bucket/elems parity, fingerprint width
        // matches the bucket's s flag, and the partial-key invariant over the short
        // fingerprint, all held after an arbitrary interleaving of inserts and deletes.
        #[test]
        fn verify_state_holds_after_random_churn(
            ops in prop::collection::vec((any::<bool>(), 0u32..400), 1..300)
        ) {
            let mut filter = CBCuckooFilter::with_seed(120, 4, 10, 20, 55).unwrap();
            let mut present: Vec<u32> = Vec::new();
            for (do_insert, key) in ops {
                let bytes = key.to_le_bytes();
                if do_insert {
                    if filter.insert(&bytes) {
                        present.push(key);
                    }
                } else if let Some(pos) = present.iter().position(|&k| k == key) {
                    if filter.delete(&bytes).is_ok() {
                        present.remove(pos);
                    }
                }
            }
            filter.verify_state();
        }

        // Property 1 (no false negatives), CBCF flavor: a key inserted and never deleted
        // must remain found regardless of short/long transitions along the way.
        #[test]
        fn inserted_keys_are_always_found(keys in prop::collection::vec(any::<u32>(), 1..150)) {
            let mut filter = CBCuckooFilter::with_seed(150, 4, 12, 20, 21).unwrap();
            let mut inserted = Vec::new();
            for key in keys {
                if filter.insert(&key.to_le_bytes()) {
                    inserted.push(key);
                }
            }
            for key in inserted {
                prop_assert!(filter.lookup(&key.to_le_bytes()));
            }
        }
    }
}

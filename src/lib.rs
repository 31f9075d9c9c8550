//! # cbcf-filters
//!
//! [![License: MIT OR Apache-2.0](https://img.shields.io/badge/License-MIT%20OR%20Apache--2.0-yellow.svg)](https://opensource.org/licenses/MIT)
//!
//! `cbcf-filters` is a small library of approximate set-membership filters: compact
//! probabilistic data structures that answer "have I seen this key?" with a controlled
//! false-positive rate and, for the cuckoo family, zero false negatives and support for
//! deletion.
//!
//! - [`bloom::BloomFilter`], a fixed-size bit vector with `k` hash functions. Supports insert
//!   and lookup only.
//! - [`cuckoo::CuckooFilter`], a cuckoo hash table of key fingerprints with partial-key cuckoo
//!   hashing and random-walk eviction. Adds delete over a bloom filter.
//! - [`cuckoo::CBCuckooFilter`], a configurable-bucket cuckoo filter. Extends the cuckoo filter
//!   with a per-bucket flag that switches between a long and a short fingerprint width depending
//!   on whether the bucket still has room, lowering the false positive rate at comparable space.
//!   This is the core, and most involved, piece of this crate; see [`cuckoo`] for the details of
//!   its insert/lookup/delete/scrub protocol.
//!
//! All three filters are generic over a pluggable [`hash_provider::HashProvider`], defaulting to
//! a keyed SipHash via [`hash_provider::SipHashProvider`].
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! cbcf-filters = "*"
//! ```
//!
//! ## On the hashed-decimal-rendering quirk
//!
//! Cuckoo-family filters compute a stored fingerprint's alternate-bucket hash by hashing the
//! *decimal ASCII rendering* of the fingerprint integer rather than its raw bytes. This reads
//! like an oversight, but it is preserved deliberately: the important property is that CBCF's
//! alternate-bucket hash is always computed from the *short* fingerprint, regardless of which
//! width a bucket currently stores, so the partial-key invariant survives a bucket's
//! Unfilled/Filled transitions. The choice of hashing the decimal rendering versus the raw
//! integer does not affect that property, only the exact bucket layout a given seed produces,
//! and is kept as-is since nothing in this crate depends on cross-compatibility with any other
//! implementation. See [`hash_provider::h2`] for where this is implemented.
//!
//! ## References
//!
//!  - [Cuckoo Filter: Practically Better Than Bloom](https://dl.acm.org/citation.cfm?id=2674994)
//!  > Fan, Bin, Dave G. Andersen, Michael Kaminsky, and Michael D. Mitzenmacher. 2014. “Cuckoo Filter: Practically Better Than Bloom.” In *Proceedings of the 10th Acm International on Conference on Emerging Networking Experiments and Technologies*, 75–88. CoNEXT ’14. New York, NY, USA: ACM. doi:[10.1145/2674005.2674994](https://doi.org/10.1145/2674005.2674994).
//!  - [Less hashing, same performance: Building a better Bloom filter](https://dl.acm.org/citation.cfm?id=1400125)
//!  > Kirsch, Adam, and Michael Mitzenmacher. 2008. “Less Hashing, Same Performance: Building a Better Bloom Filter.” *Random Struct. Algorithms* 33 (2). New York, NY, USA: John Wiley & Sons, Inc.: 187–218. doi:[10.1002/rsa.v33:2](https://doi.org/10.1002/rsa.v33:2).

#![warn(missing_docs)]

pub mod bit_vec;
pub mod bloom;
pub mod cuckoo;
pub mod error;
pub mod hash_provider;
#[cfg(feature = "measurement")]
pub mod measurement;

pub use crate::error::{Error, Result};

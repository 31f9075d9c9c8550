//! Space-efficient probabilistic data structures to test for membership in a set with the
//! ability to remove items.
//!
//! [`CuckooFilter`] is the standard partial-key cuckoo filter. [`CBCuckooFilter`] extends it with
//! a per-bucket short/long fingerprint flag that trades fingerprint width for bucket occupancy to
//! achieve a lower false positive rate at comparable space.

mod cb_cuckoo_filter;
mod cuckoo_filter;

pub use self::cb_cuckoo_filter::CBCuckooFilter;
pub use self::cuckoo_filter::CuckooFilter;

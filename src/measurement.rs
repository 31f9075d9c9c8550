//! JSON-lines output for the filter-comparison measurement harness.
//!
//! This is a collaborator to the core filters, not part of them: it exists so an external driver
//! (a benchmark binary, a notebook, a CI job) can record one measurement per experiment to a file
//! named `measurements<F>.txt`, one JSON object per line, in the schema a companion plotting
//! script expects.

use serde_crate::Serialize;
use std::io::{self, Write};

/// The sizing parameters an experiment was run under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(crate = "serde_crate")]
pub struct Parameters {
    /// `B`, the number of buckets shared by the cuckoo and CBCF filters in this experiment.
    pub num_buckets: usize,
    /// `f`, the (short) fingerprint width shared by the cuckoo and CBCF filters.
    pub fingerprint_size: u32,
    /// The fraction of total slot capacity filled before measuring, in `[0.0, 1.0]`.
    pub target_occupancy: f64,
}

/// The analytic and observed false-positive rates for all three filters in one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(crate = "serde_crate")]
pub struct Measurements {
    /// Cuckoo filter's `expected_fpr()`.
    pub cf_fpr_e: f64,
    /// Cuckoo filter's observed false positive rate over held-out queries.
    pub cf_fpr: f64,
    /// CBCF's `expected_fpr()`.
    pub cbcf_fpr_e: f64,
    /// CBCF's observed false positive rate over held-out queries.
    pub cbcf_fpr: f64,
    /// Bloom filter's `expected_fpr()`.
    pub bloom_fpr_e: f64,
    /// Bloom filter's observed false positive rate over held-out queries.
    pub bloom_fpr: f64,
}

/// One line of the `measurements<F>.txt` output: parameters paired with their measurements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(crate = "serde_crate")]
pub struct MeasurementRecord {
    /// The parameters this record's measurements were taken under.
    pub parameters: Parameters,
    /// The measurements themselves.
    pub measurements: Measurements,
}

/// Serializes `record` as one compact JSON object followed by a newline, and writes it to `w`.
///
/// # Errors
///
/// Returns the underlying I/O error if writing to `w` fails. Serialization itself cannot fail
/// for this type, since every field is a plain number.
///
/// # Examples
///
/// ```
/// use cbcf_filters::measurement::{Measurements, MeasurementRecord, Parameters, write_measurement_line};
///
/// let record = MeasurementRecord {
///     parameters: Parameters {
///         num_buckets: 8192,
///         fingerprint_size: 12,
///         target_occupancy: 0.5,
///     },
///     measurements: Measurements {
///         cf_fpr_e: 0.001,
///         cf_fpr: 0.0012,
///         cbcf_fpr_e: 0.0006,
///         cbcf_fpr: 0.0007,
///         bloom_fpr_e: 0.002,
///         bloom_fpr: 0.0021,
///     },
/// };
///
/// let mut buf = Vec::new();
/// write_measurement_line(&mut buf, &record).unwrap();
/// assert!(buf.ends_with(b"\n"));
/// ```
pub fn write_measurement_line<W: Write>(w: &mut W, record: &MeasurementRecord) -> io::Result<()> {
    let line = serde_json::to_string(record)
        .expect("MeasurementRecord serialization is infallible: plain numeric fields only");
    writeln!(w, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MeasurementRecord {
        MeasurementRecord {
            parameters: Parameters {
                num_buckets: 8192,
                fingerprint_size: 15,
                target_occupancy: 0.7,
            },
            measurements: Measurements {
                cf_fpr_e: 0.001,
                cf_fpr: 0.0009,
                cbcf_fpr_e: 0.0005,
                cbcf_fpr: 0.0004,
                bloom_fpr_e: 0.0018,
                bloom_fpr: 0.0019,
            },
        }
    }

    #[test]
    fn emits_one_newline_terminated_json_object() {
        let mut buf = Vec::new();
        write_measurement_line(&mut buf, &sample()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.trim_end().starts_with('{'));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn round_trips_through_serde_json() {
        let record = sample();
        let mut buf = Vec::new();
        write_measurement_line(&mut buf, &record).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["parameters"]["num_buckets"], 8192);
        assert_eq!(parsed["measurements"]["cbcf_fpr_e"], 0.0005);
    }
}

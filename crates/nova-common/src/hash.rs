//! Input fingerprints for drift detection
//!
//! The operator records a SHA-256 digest of every watched input under a
//! hash kind in `status.hash`. A pass compares the freshly computed digest
//! against the recorded one to decide whether downstream artifacts must be
//! regenerated.
//!
//! Digests are computed over a canonical byte layout: each part is written
//! as its length followed by its bytes, in the order it was added. Adding
//! the same parts in the same order always yields the same digest,
//! regardless of map iteration order in the caller.

use std::collections::BTreeMap;

use aws_lc_rs::digest;

/// Hash kind covering secrets, transport URL and rendered config inputs
pub const INPUT_HASH_KEY: &str = "input";

/// Compute the hex SHA-256 digest of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, bytes);
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Whether `digest` differs from what is recorded for `kind`.
///
/// A kind that was never recorded counts as changed.
pub fn has_changed(kind: &str, digest: &str, observed: &BTreeMap<String, String>) -> bool {
    observed.get(kind).map(String::as_str) != Some(digest)
}

/// Record `digest` for `kind`. Returns true if the stored value changed.
pub fn record(kind: &str, digest: &str, observed: &mut BTreeMap<String, String>) -> bool {
    if !has_changed(kind, digest, observed) {
        return false;
    }
    observed.insert(kind.to_string(), digest.to_string());
    true
}

/// Builder for the canonical byte representation of a set of inputs.
#[derive(Debug, Default, Clone)]
pub struct InputFingerprint {
    buf: Vec<u8>,
}

impl InputFingerprint {
    /// Start an empty fingerprint
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a labelled part
    pub fn part(mut self, label: &str, value: &[u8]) -> Self {
        self.write(label.as_bytes());
        self.write(value);
        self
    }

    /// Append every entry of a map, in key order
    pub fn map<V: AsRef<[u8]>>(mut self, label: &str, values: &BTreeMap<String, V>) -> Self {
        self.write(label.as_bytes());
        self.write(&(values.len() as u64).to_be_bytes());
        for (k, v) in values {
            self.write(k.as_bytes());
            self.write(v.as_ref());
        }
        self
    }

    /// Finish and return the hex digest
    pub fn digest(&self) -> String {
        fingerprint(&self.buf)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }
}

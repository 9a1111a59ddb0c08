//! Convergence verification for materialized collections.
//!
//! Two collections converged when they hold the same rows under the same
//! keys, regardless of position. Used to check that different arrival
//! orders of pages and live events end in the same state.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use rowsync_core::Row;

use crate::error::{Result, SyncError};

/// Order-independent digest of a collection's rows.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// Blake3 digest of one row's CBOR encoding.
fn row_digest<T: Serialize>(row: &T) -> Result<[u8; 32]> {
    let mut buf = Vec::new();
    ciborium::into_writer(row, &mut buf).map_err(|e| SyncError::Encoding(e.to_string()))?;
    Ok(*blake3::hash(&buf).as_bytes())
}

/// Compute the fingerprint of a collection.
///
/// Algorithm:
/// 1. Encode every row as CBOR and hash it
/// 2. Sort the row digests
/// 3. H = Blake3(domain || count || digest_1 || ... || digest_n)
pub fn collection_fingerprint<T: Serialize>(rows: &[T]) -> Result<Fingerprint> {
    let mut digests = rows.iter().map(row_digest).collect::<Result<Vec<_>>>()?;
    digests.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"rowsync-collection-v0:");
    hasher.update(&(digests.len() as u64).to_be_bytes());
    for digest in &digests {
        hasher.update(digest);
    }
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Same keys, same rows.
    Converged,
    /// The collections differ.
    NotConverged { reason: String },
    /// One side breaks key uniqueness.
    DuplicateKey { side: &'static str, key: String },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

fn key_set<'a, T: Row>(
    side: &'static str,
    rows: &'a [T],
) -> std::result::Result<HashMap<T::Key, &'a T>, ConvergenceResult> {
    let mut keys = HashMap::with_capacity(rows.len());
    for row in rows {
        let Some(key) = row.primary_key() else {
            return Err(ConvergenceResult::NotConverged {
                reason: format!("{side} holds a row without primary key"),
            });
        };
        if keys.insert(key.clone(), row).is_some() {
            return Err(ConvergenceResult::DuplicateKey {
                side,
                key: format!("{:?}", key),
            });
        }
    }
    Ok(keys)
}

/// Verify two collections converged, ignoring position.
pub fn verify_convergence<T: Row + Serialize>(left: &[T], right: &[T]) -> Result<ConvergenceResult> {
    let left_keys = match key_set("left", left) {
        Ok(keys) => keys,
        Err(result) => return Ok(result),
    };
    let right_keys = match key_set("right", right) {
        Ok(keys) => keys,
        Err(result) => return Ok(result),
    };

    let l: HashSet<_> = left_keys.keys().collect();
    let r: HashSet<_> = right_keys.keys().collect();
    if l != r {
        let only_left = l.difference(&r).count();
        let only_right = r.difference(&l).count();
        return Ok(ConvergenceResult::NotConverged {
            reason: format!("key sets differ: {only_left} only left, {only_right} only right"),
        });
    }

    for (key, row) in &left_keys {
        if row_digest(*row)? != row_digest(right_keys[key])? {
            return Ok(ConvergenceResult::NotConverged {
                reason: format!("row {:?} differs", key),
            });
        }
    }

    Ok(ConvergenceResult::Converged)
}

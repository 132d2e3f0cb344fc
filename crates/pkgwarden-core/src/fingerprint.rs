use sha2::{Digest, Sha256};

use crate::UpgradableInfo;

/// Hex SHA-256 over the canonical JSON of the sorted upgrade list, so any
/// permutation of the same list yields the same fingerprint.
pub fn update_set_fingerprint(upgradable: &[UpgradableInfo]) -> serde_json::Result<String> {
    let mut sorted = upgradable.to_vec();
    sorted.sort();
    let canonical = serde_json::to_vec(&sorted)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

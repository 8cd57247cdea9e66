use std::{collections::BTreeMap, fmt};

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::{analysis::RawFeatures, AudioBuffer};

const DOMAIN_TAG: &[u8] = b"soundcheck.analysis.v1";

/// SHA-256 cache key over buffer content and analyzer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Hashes the buffer shape and raw little-endian sample bytes, then the
/// analyzer set (sorted, deduplicated) and each analyzer's parameters.
///
/// Every variable-length field is length-prefixed so adjacent fields can't
/// run into each other.
pub fn compute_fingerprint<S: AsRef<str>>(
    buffer: &AudioBuffer,
    analyzer_names: &[S],
    params: &BTreeMap<String, RawFeatures>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TAG);
    hasher.update(buffer.sample_rate().to_le_bytes());
    hasher.update(buffer.channels().to_le_bytes());
    hasher.update((buffer.samples().len() as u64).to_le_bytes());
    for bytes in buffer.sample_bytes() {
        hasher.update(bytes);
    }

    let mut names: Vec<&str> = analyzer_names.iter().map(AsRef::as_ref).collect();
    names.sort_unstable();
    names.dedup();
    hasher.update((names.len() as u64).to_le_bytes());
    for name in names {
        update_field(&mut hasher, name);
    }

    // BTreeMap iteration is ordered, and serde_json's default map is too,
    // so the textual encoding below is canonical.
    hasher.update((params.len() as u64).to_le_bytes());
    for (analyzer, settings) in params {
        update_field(&mut hasher, analyzer);
        hasher.update((settings.len() as u64).to_le_bytes());
        for (key, value) in settings {
            update_field(&mut hasher, key);
            update_field(&mut hasher, &value.to_string());
        }
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Fingerprint(digest)
}

fn update_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

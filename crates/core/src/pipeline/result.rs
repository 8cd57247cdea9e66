use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::analysis::{FeatureSet, RawFeatures};

/// Unified analysis output for one buffer, serializable for downstream
/// recommendation layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Milliseconds since the Unix epoch at which the analysis ran.
    pub timestamp_ms: u64,
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
    /// Hex cache key, absent when the cache was bypassed.
    pub fingerprint: Option<String>,
    pub features: FeatureSet,
    /// Loose per-analyzer view, keyed by analyzer name.
    pub raw: BTreeMap<String, RawFeatures>,
    /// Analyzers that errored or panicked on this buffer.
    pub failed_analyzers: Vec<String>,
    pub suggested_actions: Vec<String>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

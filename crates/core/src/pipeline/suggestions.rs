use crate::analysis::{dsp::SILENCE_DB, FeatureSet};

const MAX_DYNAMIC_RANGE_DB: f32 = 20.0;
const LOW_LEVEL_DB: f32 = -40.0;
const DC_OFFSET_LIMIT: f32 = 0.01;
const HARSH_HIGH_RATIO: f32 = 0.5;

/// Rule checks over the aggregated features. Each rule only fires when the
/// family it reads is present.
pub fn suggest_actions(features: &FeatureSet) -> Vec<String> {
    let mut actions = Vec::new();

    let silent = features
        .dynamics
        .as_ref()
        .is_some_and(|dynamics| dynamics.peak_db <= SILENCE_DB);
    if silent {
        actions.push("Signal is silent: check the source connection and input gain".to_string());
        return actions;
    }

    let clipped = features
        .quality
        .as_ref()
        .map(|quality| quality.clipped_samples)
        .unwrap_or(0);
    if clipped > 0 {
        actions.push(format!(
            "Reduce gain: {clipped} samples are at or above full scale"
        ));
    } else if let Some(dynamics) = features.dynamics.as_ref().filter(|d| d.clipping_ratio > 0.0) {
        actions.push(format!(
            "Reduce gain: {:.2}% of samples are clipping",
            dynamics.clipping_ratio * 100.0
        ));
    }

    if let Some(dynamics) = &features.dynamics {
        if dynamics.dynamic_range_db > MAX_DYNAMIC_RANGE_DB {
            actions.push(format!(
                "Apply compression: dynamic range is {:.1} dB",
                dynamics.dynamic_range_db
            ));
        }
        if dynamics.rms_db < LOW_LEVEL_DB {
            actions.push(format!(
                "Raise the input level: RMS is {:.1} dBFS",
                dynamics.rms_db
            ));
        }
    }

    if let Some(quality) = &features.quality {
        if quality.dc_offset.abs() > DC_OFFSET_LIMIT {
            actions.push(format!(
                "Remove DC offset: mean sample value is {:.3}",
                quality.dc_offset
            ));
        }
    }

    if let Some(spatial) = &features.spatial {
        if spatial.correlation < 0.0 {
            actions.push(format!(
                "Check channel polarity: inter-channel correlation is {:.2}",
                spatial.correlation
            ));
        }
    }

    if let Some(spectral) = &features.spectral {
        if spectral.high_energy_ratio > HARSH_HIGH_RATIO {
            actions.push("Tame the high end with a high-shelf cut above 4 kHz".to_string());
        }
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DynamicsFeatures, QualityFeatures, SpatialFeatures};

    fn dynamics(rms_db: f32, range_db: f32) -> DynamicsFeatures {
        DynamicsFeatures {
            rms: 0.1,
            peak: 0.5,
            rms_db,
            peak_db: -6.0,
            crest_factor_db: 14.0,
            dynamic_range_db: range_db,
            clipping_ratio: 0.0,
        }
    }

    #[test]
    fn clean_signal_needs_nothing() {
        let features = FeatureSet {
            dynamics: Some(dynamics(-18.0, 6.0)),
            ..Default::default()
        };
        assert!(suggest_actions(&features).is_empty());
    }

    #[test]
    fn flags_range_clipping_and_polarity() {
        let features = FeatureSet {
            dynamics: Some(dynamics(-18.0, 32.0)),
            quality: Some(QualityFeatures {
                clipped_samples: 12,
                ..Default::default()
            }),
            spatial: Some(SpatialFeatures {
                correlation: -0.8,
                ..Default::default()
            }),
            ..Default::default()
        };
        let actions = suggest_actions(&features);
        assert_eq!(actions.len(), 3);
        assert!(actions[0].starts_with("Reduce gain: 12 samples"));
        assert!(actions[1].starts_with("Apply compression"));
        assert!(actions[2].starts_with("Check channel polarity"));
    }

    #[test]
    fn silence_gets_a_single_hint() {
        let features = FeatureSet {
            dynamics: Some(DynamicsFeatures::default()),
            quality: Some(QualityFeatures::default()),
            ..Default::default()
        };
        let actions = suggest_actions(&features);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].starts_with("Signal is silent"));
    }

    #[test]
    fn absent_families_produce_no_rules() {
        assert!(suggest_actions(&FeatureSet::default()).is_empty());
    }
}

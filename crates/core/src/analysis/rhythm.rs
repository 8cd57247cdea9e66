use super::{
    check_buffer, dsp::windowed_rms, Analyzer, FeatureFamily, FeatureModel, RawFeatures,
    RhythmFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

const BEAT_GAIN: f32 = 12.0;
const BEAT_THRESHOLD: f32 = 0.6;
const MIN_BEAT_INTERVAL: f32 = 0.2;
const MAX_BEAT_HISTORY: usize = 32;
const HOP_MS: u32 = 10;

/// Energy-flux onset detection and tempo estimate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RhythmAnalyzer;

impl RhythmAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for RhythmAnalyzer {
    fn name(&self) -> &str {
        "rhythm"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Rhythm
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("beat_gain".to_string(), BEAT_GAIN.into()),
            ("beat_threshold".to_string(), BEAT_THRESHOLD.into()),
            ("min_beat_interval".to_string(), MIN_BEAT_INTERVAL.into()),
            ("hop_ms".to_string(), HOP_MS.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let hop = (buffer.sample_rate() * HOP_MS / 1000).max(1) as usize;
        let hop_seconds = hop as f32 / buffer.sample_rate() as f32;
        let mut tracker = BeatTracker::default();

        for (index, rms) in windowed_rms(&buffer.mono_mix(), hop).into_iter().enumerate() {
            let timestamp = (index as f32 + 0.5) * hop_seconds;
            tracker.update(timestamp, rms);
        }

        let duration = buffer.duration_seconds();
        Ok(FeatureModel::Rhythm(RhythmFeatures {
            tempo_bpm: tracker.tempo_bpm(),
            onset_count: tracker.onsets,
            onset_rate: if duration > 0.0 {
                tracker.onsets as f32 / duration
            } else {
                0.0
            },
            pulse_clarity: tracker.pulse_clarity(),
        }))
    }
}

#[derive(Debug, Default)]
struct BeatTracker {
    last_rms: f32,
    beat_timestamps: Vec<f32>,
    onsets: usize,
}

impl BeatTracker {
    fn update(&mut self, timestamp: f32, rms: f32) {
        let delta = (rms - self.last_rms).max(0.0);
        self.last_rms = rms;
        let confidence = (delta * BEAT_GAIN).clamp(0.0, 1.0);

        if confidence >= BEAT_THRESHOLD
            && self
                .beat_timestamps
                .last()
                .map(|last| timestamp - last >= MIN_BEAT_INTERVAL)
                .unwrap_or(true)
        {
            self.onsets += 1;
            self.beat_timestamps.push(timestamp);
            if self.beat_timestamps.len() > MAX_BEAT_HISTORY {
                let overflow = self.beat_timestamps.len() - MAX_BEAT_HISTORY;
                self.beat_timestamps.drain(0..overflow);
            }
        }
    }

    fn intervals(&self) -> Vec<f32> {
        self.beat_timestamps
            .windows(2)
            .map(|window| window[1] - window[0])
            .filter(|interval| *interval > f32::EPSILON)
            .collect()
    }

    fn tempo_bpm(&self) -> Option<f32> {
        let intervals = self.intervals();
        if intervals.is_empty() {
            return None;
        }
        let average = intervals.iter().sum::<f32>() / intervals.len() as f32;
        (average > 0.0).then(|| 60.0 / average)
    }

    /// One minus the coefficient of variation of beat intervals.
    fn pulse_clarity(&self) -> f32 {
        let intervals = self.intervals();
        if intervals.len() < 2 {
            return 0.0;
        }
        let mean = intervals.iter().sum::<f32>() / intervals.len() as f32;
        let variance =
            intervals.iter().map(|i| (i - mean).powi(2)).sum::<f32>() / intervals.len() as f32;
        (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40 ms bursts every `period` seconds.
    fn pulses(sample_rate: u32, seconds: f32, period: f32) -> AudioBuffer {
        let total = (sample_rate as f32 * seconds) as usize;
        let burst = (sample_rate as f32 * 0.04) as usize;
        let step = (sample_rate as f32 * period) as usize;
        let samples = (0..total)
            .map(|i| if i % step < burst { 0.8 } else { 0.0 })
            .collect();
        AudioBuffer::from_interleaved(samples, sample_rate, 1)
    }

    #[test]
    fn detects_steady_tempo() {
        let FeatureModel::Rhythm(features) =
            RhythmAnalyzer.extract_features(&pulses(8_000, 4.0, 0.5)).unwrap()
        else {
            panic!("wrong family");
        };
        let tempo = features.tempo_bpm.expect("tempo should be detected");
        assert!((tempo - 120.0).abs() < 5.0);
        assert_eq!(features.onset_count, 8);
        assert!(features.pulse_clarity > 0.9);
    }

    #[test]
    fn steady_tone_has_single_onset() {
        let buffer = AudioBuffer::from_interleaved(vec![0.5; 8_000], 8_000, 1);
        let FeatureModel::Rhythm(features) = RhythmAnalyzer.extract_features(&buffer).unwrap() else {
            panic!("wrong family");
        };
        assert_eq!(features.onset_count, 1);
        assert!(features.tempo_bpm.is_none());
    }
}

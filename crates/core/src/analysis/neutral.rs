use super::{check_buffer, Analyzer, FeatureFamily, FeatureModel};
use crate::{AnalyzerError, AudioBuffer};

/// Stand-in used when an analyzer's backing computation is unavailable.
/// Always reports the family's neutral features.
#[derive(Debug, Clone)]
pub struct NeutralAnalyzer {
    name: String,
    family: FeatureFamily,
}

impl NeutralAnalyzer {
    pub fn new(name: impl Into<String>, family: FeatureFamily) -> Self {
        Self {
            name: name.into(),
            family,
        }
    }
}

impl Analyzer for NeutralAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> FeatureFamily {
        self.family
    }

    fn parameters(&self) -> super::RawFeatures {
        super::RawFeatures::from([("neutral".to_string(), true.into())])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        check_buffer(buffer)?;
        Ok(FeatureModel::neutral(self.family))
    }
}

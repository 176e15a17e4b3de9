use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::page_classifier::ClassifierConfig;
use crate::devis::SpecConfig;
use crate::index::IndexConfig;
use crate::rooms::{DetectorConfig, FixerConfig, MatcherConfig, MergeConfig};

/// Every tunable, grouped by component. Sections missing from the file
/// keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub matcher: MatcherConfig,
    pub detector: DetectorConfig,
    pub fixer: FixerConfig,
    pub classifier: ClassifierConfig,
    pub merge: MergeConfig,
    pub index: IndexConfig,
    pub devis: SpecConfig,
}

impl Settings {
    /// `None` gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let settings = Self::from_toml(&data)
            .with_context(|| format!("invalid config {}", path.display()))?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.fixer.padding_px, 30.0);
        assert_eq!(settings.merge.low_confidence, 0.5);
        assert!(settings.matcher.uppercase_heuristic);
    }

    #[test]
    fn overrides_single_fields() {
        let settings = Settings::from_toml(
            r#"
[fixer]
padding_px = 12.0

[detector]
margin = 2.5

[detector.confidence]
unpaired_factor = 0.4

[matcher]
uppercase_heuristic = false

[devis]
context_after = 4
"#,
        )
        .unwrap();
        assert_eq!(settings.fixer.padding_px, 12.0);
        assert_eq!(settings.fixer.name_distance_fraction, 0.15);
        assert_eq!(settings.detector.margin, 2.5);
        assert_eq!(settings.detector.confidence.unpaired_factor, 0.4);
        assert_eq!(settings.detector.confidence.duplicate_factor, 0.5);
        assert!(!settings.matcher.uppercase_heuristic);
        assert!(!settings.matcher.lexicon.is_empty());
        assert_eq!(settings.devis.context_after, 4);
        assert_eq!(settings.devis.context_before, 3);
    }

    #[test]
    fn rejects_unparsable_file() {
        assert!(Settings::from_toml("[fixer\npadding_px = ").is_err());
    }
}

//! Pipeline and index configuration.
use serde::de::Error;

/// Simplification pipeline configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Branching factor per grid level, coarsest first
    #[serde(default = "Config::default_branching")]
    pub branching: Vec<u32>,

    /// Collapse cells whose features agree on a label into rectangles.
    /// Turning this off also stops the index from trusting single-feature
    /// cells, since the features no longer fill them.
    #[serde(default = "Config::default_simplify_single_label_cells")]
    pub simplify_single_label_cells: bool,

    /// Infer weak labels for uncovered regions before simplifying
    #[serde(default)]
    pub fill_gaps: bool,

    /// Attribute holding the label in input and output datasets
    #[serde(default = "Config::default_label_attribute")]
    pub label_attribute: String,

    #[serde(default)]
    pub index: IndexOptions,
}

/// How a [`SpatialIndex`](crate::index::SpatialIndex) stores its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexOptions {
    /// Store cells holding one feature as a bare label. When off, every
    /// lookup tests geometry containment.
    #[serde(default = "IndexOptions::default_collapse_single_label_cells")]
    pub collapse_single_label_cells: bool,
}

impl IndexOptions {
    const fn default_collapse_single_label_cells() -> bool {
        true
    }

    pub fn with_collapse_single_label_cells(mut self, enabled: bool) -> Self {
        self.collapse_single_label_cells = enabled;
        self
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            collapse_single_label_cells: Self::default_collapse_single_label_cells(),
        }
    }
}

impl Config {
    fn default_branching() -> Vec<u32> {
        vec![40, 2, 2, 2]
    }

    const fn default_simplify_single_label_cells() -> bool {
        true
    }

    fn default_label_attribute() -> String {
        "label".to_string()
    }

    pub fn with_branching(mut self, branching: impl Into<Vec<u32>>) -> Self {
        self.branching = branching.into();
        self
    }

    pub fn with_simplify_single_label_cells(mut self, enabled: bool) -> Self {
        self.simplify_single_label_cells = enabled;
        self.index.collapse_single_label_cells = enabled;
        self
    }

    pub fn with_fill_gaps(mut self, enabled: bool) -> Self {
        self.fill_gaps = enabled;
        self
    }

    pub fn with_label_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.label_attribute = attribute.into();
        self
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index = options;
        self
    }

    /// Index options for datasets this configuration produced. Single-feature
    /// cells only collapse when the simplifier filled them.
    pub fn effective_index_options(&self) -> IndexOptions {
        self.index.with_collapse_single_label_cells(
            self.index.collapse_single_label_cells && self.simplify_single_label_cells,
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.branching.is_empty() {
            return Err("At least one branching factor is required".to_string());
        }

        if let Some(level) = self.branching.iter().position(|&b| b == 0) {
            return Err(format!(
                "Branching factor at level {} must be greater than zero",
                level
            ));
        }

        let cells_per_axis = self
            .branching
            .iter()
            .try_fold(1u64, |acc, &b| acc.checked_mul(u64::from(b)));
        if cells_per_axis.is_none_or(|cells| cells > 1 << 53) {
            return Err(format!(
                "Branching factors {:?} produce too many cells per axis",
                self.branching
            ));
        }

        if self.label_attribute.is_empty() {
            return Err("Label attribute must not be empty".to_string());
        }

        if self
            .label_attribute
            .starts_with(crate::grid::ADDRESS_ATTRIBUTE_PREFIX)
        {
            log::warn!(
                "Label attribute {} looks like a cell address attribute",
                self.label_attribute
            );
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branching: Self::default_branching(),
            simplify_single_label_cells: Self::default_simplify_single_label_cells(),
            fill_gaps: false,
            label_attribute: Self::default_label_attribute(),
            index: IndexOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.branching, vec![40, 2, 2, 2]);
        assert!(config.simplify_single_label_cells);
        assert!(!config.fill_gaps);
        assert_eq!(config.label_attribute, "label");
        assert!(config.index.collapse_single_label_cells);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_branching(vec![10, 3])
            .with_fill_gaps(true)
            .with_simplify_single_label_cells(false)
            .with_label_attribute("tzid")
            .with_index_options(IndexOptions::default().with_collapse_single_label_cells(false));

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{"label_attribute": "tzid"}"#).unwrap();
        assert_eq!(config.branching, vec![40, 2, 2, 2]);
        assert_eq!(config.label_attribute, "tzid");
        assert!(config.index.collapse_single_label_cells);
    }

    #[test]
    fn test_unsimplified_cells_are_not_collapsed() {
        let config = Config::default().with_simplify_single_label_cells(false);
        assert!(!config.index.collapse_single_label_cells);
        assert!(!config.effective_index_options().collapse_single_label_cells);

        let config = Config::from_json(r#"{"simplify_single_label_cells": false}"#).unwrap();
        assert!(config.index.collapse_single_label_cells);
        assert!(!config.effective_index_options().collapse_single_label_cells);

        let config = Config::default()
            .with_index_options(IndexOptions::default().with_collapse_single_label_cells(false));
        assert!(!config.effective_index_options().collapse_single_label_cells);
        assert!(Config::default().effective_index_options().collapse_single_label_cells);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(Config::from_json(r#"{"branchings": [2]}"#).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().with_branching(Vec::new()).validate().is_err());
        assert!(Config::default().with_branching(vec![4, 0]).validate().is_err());
        assert!(Config::default().with_label_attribute("").validate().is_err());
        assert!(
            Config::default()
                .with_branching(vec![u32::MAX, u32::MAX])
                .validate()
                .is_err()
        );
        assert!(Config::from_json(r#"{"branching": [2, 0]}"#).is_err());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = Config::from_toml(
            r#"
            branching = [8, 2]
            fill_gaps = true
            label_attribute = "tzid"

            [index]
            collapse_single_label_cells = false
            "#,
        )
        .unwrap();
        assert_eq!(config.branching, vec![8, 2]);
        assert!(config.fill_gaps);
        assert!(!config.index.collapse_single_label_cells);

        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}

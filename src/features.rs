use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Strategy parameters as configured on the Unleash server.
pub type Parameters = HashMap<String, String>;

/// A set of feature definitions, as returned by the features endpoint.
///
/// `FeatureSet` is the unit of caching: it is replaced wholesale on every successful fetch and
/// never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    #[serde(default)]
    pub features: Vec<FeatureDefinition>,
    /// Unix timestamp (seconds) after which the set is considered stale. Stamped by the client at
    /// fetch time; server responses don't carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
}

impl FeatureSet {
    /// Find the first feature with the given name.
    pub fn get(&self, name: &str) -> Option<&FeatureDefinition> {
        self.features.iter().find(|feature| feature.name == name)
    }
}

/// A single feature toggle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    /// Strategies are evaluated in order. An enabled feature without strategies is on for
    /// everyone.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Reference to a named activation strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl FeatureDefinition {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        FeatureDefinition {
            name: name.into(),
            description: None,
            enabled,
            strategies: Vec::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: StrategyConfig) -> Self {
        self.strategies.push(strategy);
        self
    }
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        StrategyConfig {
            name: name.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

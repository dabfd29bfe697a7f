//! Component configuration.
//!
//! Every core receives a plain dictionary of string keys to scalar values at
//! construction. Typed getters fall back to documented defaults so a missing
//! key is never fatal after construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A configuration scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Number(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Text(v.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Flag(v)
    }
}

/// Flat key-value configuration dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    values: HashMap<String, ConfigValue>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl Into<ConfigValue>) -> &mut Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<ConfigValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn number(&self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(ConfigValue::Number(v)) => *v,
            _ => default,
        }
    }

    pub fn text(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(ConfigValue::Text(v)) => v.clone(),
            _ => default.to_string(),
        }
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(ConfigValue::Flag(v)) => *v,
            _ => default,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

/// Engine-level options with their documented defaults.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_portfolio_risk: f64,
    pub starting_capital: f64,
    pub tick_interval_seconds: f64,
    pub risk_sample_every_n_ticks: u64,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_portfolio_risk: config.number("max_portfolio_risk", 0.02),
            starting_capital: config.number("starting_capital", 1_000_000.0),
            tick_interval_seconds: config.number("tick_interval_seconds", 1.0),
            risk_sample_every_n_ticks: config.number("risk_sample_every_n_ticks", 60.0) as u64,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

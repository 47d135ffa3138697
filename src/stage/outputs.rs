// src/stage/outputs.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::StageMode;

/// One entry of `<tool> output -json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    pub value: serde_json::Value,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub kind: serde_json::Value,
}

impl OutputValue {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }
}

/// Output name to value, as reported after apply.
pub type StageOutputs = BTreeMap<String, OutputValue>;

/// Result of running one stage in one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: String,
    pub mode: StageMode,
    /// Empty unless `mode` is `Apply`.
    pub outputs: StageOutputs,
}

impl StageResult {
    pub fn new(stage: impl Into<String>, mode: StageMode) -> Self {
        Self {
            stage: stage.into(),
            mode,
            outputs: StageOutputs::new(),
        }
    }

    pub fn output(&self, key: &str) -> Option<&OutputValue> {
        self.outputs.get(key)
    }
}

/// Parse the JSON document printed by `<tool> output -json`.
pub fn parse_outputs(json: &str) -> Result<StageOutputs, serde_json::Error> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(StageOutputs::new());
    }
    serde_json::from_str(trimmed)
}

/*! Compiler options.
 *
 * One value per compilation unit, shared read-only by every graph compiled under it. Options
 * deserialize from JSON so drivers and tests can keep them in files next to the inputs.
 */

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed options: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationLevel {
    #[default]
    None,
    /// CFG and def-use symmetry only.
    Cheap,
    /// Also recomputes dominators and loops and compares them with the cached results.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Per-pass switches keyed by pass name. Missing entries are enabled.
    pub passes: IndexMap<String, bool>,
    pub freq_based_branch_reorder: bool,
    /// Minimal branch skew, in percent, before the colder successor is moved out of line.
    pub freq_based_branch_reorder_threshold: u32,
    pub scheduling: bool,
    pub sched_latency: u32,
    pub sched_latency_long: u32,
    pub max_insts_count: usize,
    pub max_code_size: usize,
    pub verification: VerificationLevel,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            passes: IndexMap::new(),
            freq_based_branch_reorder: true,
            freq_based_branch_reorder_threshold: 80,
            scheduling: true,
            sched_latency: 1,
            sched_latency_long: 7,
            max_insts_count: 100_000,
            max_code_size: 1 << 20,
            verification: VerificationLevel::None,
        }
    }
}

impl CompilerOptions {
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String, OptionsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_pass_enabled(&self, name: &str) -> bool {
        self.passes.get(name).copied().unwrap_or(true)
    }

    pub fn set_pass_enabled(&mut self, name: impl Into<String>, enabled: bool) {
        self.passes.insert(name.into(), enabled);
    }

    pub fn verification_enabled(&self) -> bool {
        self.verification != VerificationLevel::None
    }

    /// Sets a single option from its textual form, e.g. `sched_latency = 3` or
    /// `passes.Scheduler = false`.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), OptionsError> {
        let parsed =
            serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.into()));

        if let Some(pass) = key.strip_prefix("passes.") {
            let enabled = parsed
                .as_bool()
                .ok_or_else(|| OptionsError::UnknownOption(format!("{} = {}", key, value)))?;
            self.set_pass_enabled(pass, enabled);
            return Ok(());
        }

        let mut json = serde_json::to_value(&*self)?;
        let fields = json
            .as_object_mut()
            .ok_or_else(|| OptionsError::UnknownOption(key.to_string()))?;
        if !fields.contains_key(key) || key == "passes" {
            return Err(OptionsError::UnknownOption(key.to_string()));
        }
        fields.insert(key.to_string(), parsed);
        *self = serde_json::from_value(json)?;
        Ok(())
    }
}

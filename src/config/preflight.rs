//! Environment preflight for supervised processes.
//!
//! The Django-side processes read their settings from the environment and
//! from a `.env` file in their project directory, and refuse to boot when a
//! variable is missing. Checking the same variables before launch turns a
//! crash loop into a single readable report.

use super::ProcessSpec;
use crate::error::{PmError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Outcome of checking one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub process: String,
    /// env file that was consulted, if it existed
    pub env_file: Option<PathBuf>,
    /// Required variables that are unset or empty
    pub missing: Vec<String>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }

    /// Turn a failed report into an error
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(PmError::PreflightFailed(format!(
                "{}: missing {}",
                self.process,
                self.missing.join(", ")
            )))
        }
    }
}

/// Parse dotenv-style `KEY=VALUE` lines
pub fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        let value = if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            &value[1..value.len() - 1]
        } else {
            // Unquoted values may carry a trailing comment
            match value.find(" #") {
                Some(idx) => value[..idx].trim_end(),
                None => value,
            }
        };

        vars.insert(key.to_string(), value.to_string());
    }

    vars
}

/// Environment the process will see: ambient, then env file, then overrides
pub fn effective_env(
    spec: &ProcessSpec,
    ambient: &HashMap<String, String>,
) -> (HashMap<String, String>, Option<PathBuf>) {
    let mut env = ambient.clone();
    let mut consulted = None;

    if let Some(ref path) = spec.env_file {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                // Values already in the environment win, as they do for django-environ
                for (key, value) in parse_env_file(&contents) {
                    env.entry(key).or_insert(value);
                }
                consulted = Some(path.clone());
            }
            Err(e) => {
                tracing::debug!(
                    "env file {} for {} not readable: {}",
                    path.display(),
                    spec.name,
                    e
                );
            }
        }
    }

    for (key, value) in &spec.env {
        env.insert(key.clone(), value.clone());
    }

    (env, consulted)
}

/// Check one record against an ambient environment
pub fn check(spec: &ProcessSpec, ambient: &HashMap<String, String>) -> PreflightReport {
    let (env, env_file) = effective_env(spec, ambient);

    let is_set = |name: &str| env.get(name).map(|v| !v.is_empty()).unwrap_or(false);

    let missing: Vec<String> = spec
        .required_env
        .iter()
        .filter(|name| !is_set(name))
        .cloned()
        .collect();

    PreflightReport {
        process: spec.name.clone(),
        env_file,
        missing,
    }
}

/// Check every record against the current process environment
pub fn check_all(specs: &[ProcessSpec]) -> Vec<PreflightReport> {
    let ambient: HashMap<String, String> = std::env::vars().collect();
    specs.iter().map(|spec| check(spec, &ambient)).collect()
}

//! Extraction of per-phase size limits from lifecycle policy metadata.
//!
//! Limits live in the policy's `_meta` object:
//!
//! ```json
//! {
//!   "_meta": {
//!     "ilm-limiter": {
//!       "phases": {
//!         "hot": { "max_size": "500gb" },
//!         "warm": { "max_size": "2tb" }
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! A policy whose metadata does not match this shape is not an error: it is
//! simply not limited and gets filtered out of the run.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::lifecycle::{LifecyclePolicy, PhaseConfig, PhaseLimit, RawPolicy};
use crate::phase::Phase;
use crate::size;

/// Key of the limiter section inside a policy's `_meta` object.
pub const LIMITER_KEY: &str = "ilm-limiter";

const PHASES_KEY: &str = "phases";
const MAX_SIZE_KEY: &str = "max_size";

/// Metadata that does not form a valid limiter section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid limiter configuration at `{path}`: {reason}")]
pub struct LimiterConfigError {
    /// Dotted path of the offending field, e.g. `_meta.ilm-limiter.phases.hot.max_size`.
    pub path: String,
    pub reason: String,
}

impl LimiterConfigError {
    fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Validated limiter section, keyed by phase name as written in the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimiterConfig {
    pub phases: BTreeMap<String, PhaseLimit>,
}

impl LimiterConfig {
    /// Parses the limiter section out of a policy's `_meta` value.
    pub fn parse(metadata: Option<&Value>) -> Result<Self, LimiterConfigError> {
        let meta = object_at(metadata, "_meta")?;
        for (key, value) in meta {
            if key != LIMITER_KEY
                && !matches!(value, Value::Object(_) | Value::String(_) | Value::Array(_))
            {
                return Err(LimiterConfigError::new(
                    format!("_meta.{key}"),
                    "expected an object, string or list",
                ));
            }
        }

        let section_path = format!("_meta.{LIMITER_KEY}");
        let section = object_at(meta.get(LIMITER_KEY), &section_path)?;
        reject_unknown_fields(section, &section_path, &[PHASES_KEY])?;

        let phases_path = format!("{section_path}.{PHASES_KEY}");
        let entries = object_at(section.get(PHASES_KEY), &phases_path)?;

        let mut phases = BTreeMap::new();
        for (phase, entry) in entries {
            let entry_path = format!("{phases_path}.{phase}");
            let entry = object_at(Some(entry), &entry_path)?;
            reject_unknown_fields(entry, &entry_path, &[MAX_SIZE_KEY])?;

            let size_path = format!("{entry_path}.{MAX_SIZE_KEY}");
            let max_size = match entry.get(MAX_SIZE_KEY) {
                Some(Value::String(text)) => text.clone(),
                Some(_) => return Err(LimiterConfigError::new(size_path, "expected a string")),
                None => return Err(LimiterConfigError::new(size_path, "missing")),
            };
            let max_size_bytes = size::to_bytes(&max_size)
                .map_err(|e| LimiterConfigError::new(size_path, e.to_string()))?;

            phases.insert(
                phase.clone(),
                PhaseLimit {
                    max_size,
                    max_size_bytes,
                },
            );
        }

        Ok(Self { phases })
    }
}

fn object_at<'a>(
    value: Option<&'a Value>,
    path: &str,
) -> Result<&'a Map<String, Value>, LimiterConfigError> {
    match value {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(LimiterConfigError::new(path, "expected an object")),
        None => Err(LimiterConfigError::new(path, "missing")),
    }
}

fn reject_unknown_fields(
    map: &Map<String, Value>,
    path: &str,
    allowed: &[&str],
) -> Result<(), LimiterConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(LimiterConfigError::new(
            format!("{path}.{key}"),
            "unexpected field",
        )),
        None => Ok(()),
    }
}

/// Merges a policy's limiter section onto its phase definitions.
///
/// Limits for phases the policy does not define are dropped with a warning.
pub fn extract(name: &str, raw: &RawPolicy) -> Result<LifecyclePolicy, LimiterConfigError> {
    let limiter = LimiterConfig::parse(raw.metadata.as_ref())?;
    let definitions = object_at(Some(&raw.phases), PHASES_KEY)?;

    let mut phases = Vec::with_capacity(definitions.len());
    for phase_name in definitions.keys() {
        match phase_name.parse::<Phase>() {
            Ok(phase) => phases.push(PhaseConfig { phase, limit: None }),
            Err(()) => tracing::debug!(
                policy = %name,
                phase = %phase_name,
                "Ignoring phase outside the lifecycle phase order"
            ),
        }
    }

    for (phase_name, limit) in limiter.phases {
        let config = phases
            .iter_mut()
            .find(|config| config.phase.as_str() == phase_name);

        match config {
            Some(config) => config.limit = Some(limit),
            None => tracing::warn!(
                "lifecycle '{}' has no phase '{}' but limits",
                name,
                phase_name
            ),
        }
    }

    Ok(LifecyclePolicy::new(name, phases, raw.indices.clone()))
}

/// Keeps only the policies carrying a valid limiter section.
pub fn filter_policies(raw: BTreeMap<String, RawPolicy>) -> Vec<LifecyclePolicy> {
    raw.into_iter()
        .filter_map(|(name, policy)| match extract(&name, &policy) {
            Ok(policy) => {
                tracing::debug!("lifecycle '{}' has a valid ilm-limiter configuration", name);
                Some(policy)
            }
            Err(e) => {
                tracing::debug!(
                    "lifecycle '{}' has no valid ilm-limiter configuration ({})",
                    name,
                    e
                );
                None
            }
        })
        .collect()
}

//! Module settings driven by desired-property patches.
//!
//! Settings are only ever changed through [`ModuleSettings::apply_desired`],
//! which also builds the reported-properties patch that acknowledges each
//! recognized setting back to the twin.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Key the twin uses for the patch version.
pub const DESIRED_VERSION_KEY: &str = "$version";

/// Capability name to value, restricted to a declared set of names.
#[derive(Debug, Clone, Default)]
pub struct ModuleSettings {
    defaults: BTreeMap<String, Value>,
    values: BTreeMap<String, Value>,
}

impl ModuleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a recognized setting and its default value.
    pub fn with_setting(mut self, name: impl Into<String>, default: Value) -> Self {
        let name = name.into();
        self.values.insert(name.clone(), default.clone());
        self.defaults.insert(name, default);
        self
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> &str {
        self.values.get(name).and_then(Value::as_str).unwrap_or("")
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Apply a desired-properties patch.
    ///
    /// Recognized names take the patched value (null resets to the default);
    /// other names are left for the caller to report. Returns the
    /// reported-properties patch, empty when nothing was recognized.
    pub fn apply_desired(&mut self, desired: &Value) -> Map<String, Value> {
        let mut reported = Map::new();

        let Some(entries) = desired.as_object() else {
            return reported;
        };

        let version = entries
            .get(DESIRED_VERSION_KEY)
            .cloned()
            .unwrap_or(Value::Null);

        for (name, value) in entries {
            if name == DESIRED_VERSION_KEY {
                continue;
            }

            let Some(default) = self.defaults.get(name) else {
                continue;
            };

            let value = if value.is_null() {
                default.clone()
            } else {
                value.clone()
            };

            self.values.insert(name.clone(), value.clone());
            reported.insert(name.clone(), acknowledged(value, &version));
        }

        reported
    }
}

/// Names in a desired patch that none of `reported` acknowledges.
pub fn unrecognized_names<'a>(
    desired: &'a Value,
    reported: &Map<String, Value>,
) -> Vec<&'a str> {
    desired
        .as_object()
        .map(|entries| {
            entries
                .keys()
                .map(String::as_str)
                .filter(|name| *name != DESIRED_VERSION_KEY && !reported.contains_key(*name))
                .collect()
        })
        .unwrap_or_default()
}

/// Reported-property acknowledgement for one setting.
pub fn acknowledged(value: Value, version: &Value) -> Value {
    json!({
        "value": value,
        "ac": 200,
        "ad": "completed",
        "av": version
    })
}

//! The linear chain of viewer migration steps
//!
//! Each step is a pure function over one viewer config object and is safe
//! to run on input that is already in its output shape, so re-running the
//! chain over converted output changes nothing.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::{expressions, plugins};

/// One schema upgrade, applied to viewers whose version is below `version`
#[derive(Debug, Clone, Copy)]
pub struct Step {
    /// Schema version this step produces
    pub version: u64,
    pub name: &'static str,
    pub run: fn(Map<String, Value>) -> Map<String, Value>,
}

/// Every step in application order
pub const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "rename-legacy-keys",
        run: rename_legacy_keys,
    },
    Step {
        version: 2,
        name: "computed-columns-to-expressions",
        run: expressions::migrate,
    },
    Step {
        version: 3,
        name: "plugin-names",
        run: plugins::migrate,
    },
    Step {
        version: 4,
        name: "fill-null-defaults",
        run: fill_null_defaults,
    },
];

/// Version produced by the last step
pub const CURRENT_VERSION: u64 = 4;

/// Collection fields and the value `null` normalizes to
pub(crate) const COLLECTION_DEFAULTS: &[(&str, fn() -> Value)] = &[
    ("group_by", empty_array),
    ("split_by", empty_array),
    ("columns", empty_array),
    ("filter", empty_array),
    ("sort", empty_array),
    ("expressions", empty_array),
    ("aggregates", empty_object),
];

const KEY_RENAMES: &[(&str, &str)] = &[
    ("row-pivots", "group_by"),
    ("row_pivots", "group_by"),
    ("row-pivot", "group_by"),
    ("column-pivots", "split_by"),
    ("column_pivots", "split_by"),
    ("filters", "filter"),
    ("computed-columns", "computed_columns"),
    ("plugin-config", "plugin_config"),
];

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Schema version recorded on a viewer config, zero when absent
pub fn version_of(config: &Map<String, Value>) -> u64 {
    config.get("version").and_then(Value::as_u64).unwrap_or(0)
}

/// Run every step newer than the config's recorded version
pub fn upgrade(mut config: Map<String, Value>) -> Map<String, Value> {
    let from = version_of(&config);
    for step in STEPS.iter().filter(|step| step.version > from) {
        tracing::trace!(step = step.name, version = step.version, "applying migration step");
        config = (step.run)(config);
    }
    config
}

/// Rename legacy keys in place, keeping their position.
///
/// A legacy key whose current name is also present is dropped.
fn rename_legacy_keys(config: Map<String, Value>) -> Map<String, Value> {
    let present: HashSet<String> = config.keys().cloned().collect();
    let mut renamed = Map::new();

    for (key, value) in config {
        match KEY_RENAMES.iter().find(|(legacy, _)| *legacy == key) {
            Some((_, current)) if present.contains(*current) || renamed.contains_key(*current) => {
                tracing::debug!(legacy = %key, current, "dropping legacy key shadowed by current key");
            }
            Some((_, current)) => {
                renamed.insert(current.to_string(), value);
            }
            None => {
                renamed.insert(key, value);
            }
        }
    }

    renamed
}

fn fill_null_defaults(mut config: Map<String, Value>) -> Map<String, Value> {
    for (key, default) in COLLECTION_DEFAULTS {
        if let Some(value) = config.get_mut(*key) {
            if value.is_null() {
                *value = default();
            }
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_steps_are_ordered() {
        let versions: Vec<u64> = STEPS.iter().map(|step| step.version).collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.last(), Some(&CURRENT_VERSION));
    }

    #[test]
    fn test_rename_keeps_position() {
        let config = rename_legacy_keys(object(json!({
            "plugin": "Datagrid",
            "row-pivots": ["State"],
            "columns": ["Sales"],
        })));
        let keys: Vec<&str> = config.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["plugin", "group_by", "columns"]);
    }

    #[test]
    fn test_current_key_wins_over_legacy() {
        let config = rename_legacy_keys(object(json!({
            "row-pivots": ["Legacy"],
            "group_by": ["Current"],
        })));
        assert_eq!(config.len(), 1);
        assert_eq!(config["group_by"], json!(["Current"]));
    }

    #[test]
    fn test_fill_null_defaults() {
        let config = fill_null_defaults(object(json!({
            "group_by": null,
            "aggregates": null,
            "theme": null,
        })));
        assert_eq!(config["group_by"], json!([]));
        assert_eq!(config["aggregates"], json!({}));
        assert_eq!(config["theme"], Value::Null);
        assert!(!config.contains_key("sort"));
    }

    #[test]
    fn test_current_version_skips_steps() {
        let config = upgrade(object(json!({
            "version": CURRENT_VERSION,
            "row-pivots": ["State"],
        })));
        assert!(config.contains_key("row-pivots"));
    }
}

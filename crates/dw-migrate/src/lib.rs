//! Migration of legacy workspace and viewer configs to the current schema
//!
//! [`convert`] is a pure function: it accepts either a whole workspace config
//! or a single viewer config in any legacy shape and returns the current
//! shape. Unrecognized fields pass through untouched; only structurally
//! invalid input is rejected.

mod expressions;
pub mod plugins;
pub mod steps;

use serde_json::{Map, Value};
use thiserror::Error;

use dw_core::WorkspaceConfig;

pub use steps::{Step, CURRENT_VERSION, STEPS};

/// Errors raised for input that cannot be migrated
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("invalid structure at `{path}`: expected {expected}")]
    InvalidStructure { path: String, expected: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Options for [`convert`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertOptions {
    /// Stamp the schema version on every viewer and fill every collection
    /// with its default, in canonical key order, so converted configs can be
    /// compared for exact equality
    pub replace_defaults: bool,
}

impl ConvertOptions {
    pub fn replace_defaults() -> Self {
        Self {
            replace_defaults: true,
        }
    }
}

/// Viewer keys in canonical order; other keys follow in input order
const VIEWER_KEY_ORDER: &[&str] = &[
    "version",
    "table",
    "name",
    "plugin",
    "plugin_config",
    "settings",
    "theme",
    "group_by",
    "split_by",
    "columns",
    "filter",
    "sort",
    "expressions",
    "aggregates",
    "linked",
    "master",
];

const WORKSPACE_KEY_ORDER: &[&str] = &["sizes", "master", "detail", "viewers", "mode"];

/// Convert a legacy workspace or viewer config to the current schema
pub fn convert(config: &Value, options: ConvertOptions) -> Result<Value> {
    let object = as_object(config, "$")?;
    if is_workspace(object) {
        convert_workspace_object(object.clone(), options).map(Value::Object)
    } else {
        Ok(Value::Object(convert_viewer_object(object.clone(), options)))
    }
}

/// Convert a single viewer config
pub fn convert_viewer(config: &Value, options: ConvertOptions) -> Result<Value> {
    let object = as_object(config, "$")?;
    Ok(Value::Object(convert_viewer_object(object.clone(), options)))
}

/// Convert a legacy workspace config straight into the typed model
pub fn convert_workspace(config: &Value) -> Result<WorkspaceConfig> {
    let object = as_object(config, "$")?;
    if !is_workspace(object) {
        return Err(MigrationError::InvalidStructure {
            path: "$".into(),
            expected: "a workspace object with `viewers` or `detail`",
        });
    }
    let converted = convert_workspace_object(object.clone(), ConvertOptions::default())?;
    Ok(serde_json::from_value(Value::Object(converted))?)
}

/// A viewer config may carry `master: true`; only a workspace has an
/// object under `master`
fn is_workspace(object: &Map<String, Value>) -> bool {
    object.contains_key("viewers")
        || object.contains_key("detail")
        || matches!(object.get("master"), Some(Value::Object(_)))
}

fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| MigrationError::InvalidStructure {
        path: path.to_string(),
        expected: "an object",
    })
}

fn convert_workspace_object(mut workspace: Map<String, Value>, options: ConvertOptions) -> Result<Map<String, Value>> {
    let viewers = match workspace.remove("viewers") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(viewers)) => viewers,
        Some(_) => {
            return Err(MigrationError::InvalidStructure {
                path: "viewers".into(),
                expected: "an object",
            })
        }
    };

    let mut converted = Map::new();
    for (name, viewer) in viewers {
        match viewer {
            Value::Object(viewer) => {
                converted.insert(name, Value::Object(convert_viewer_object(viewer, options)));
            }
            _ => {
                return Err(MigrationError::InvalidStructure {
                    path: format!("viewers.{}", name),
                    expected: "an object",
                })
            }
        }
    }
    workspace.insert("viewers".into(), Value::Object(converted));

    match workspace.get_mut("detail") {
        None | Some(Value::Null) => {
            let mut detail = Map::new();
            detail.insert("main".into(), Value::Null);
            workspace.insert("detail".into(), Value::Object(detail));
        }
        Some(Value::Object(detail)) => {
            detail.entry("main").or_insert(Value::Null);
        }
        Some(_) => {
            return Err(MigrationError::InvalidStructure {
                path: "detail".into(),
                expected: "an object",
            })
        }
    }

    if options.replace_defaults {
        workspace = reorder(workspace, WORKSPACE_KEY_ORDER);
    }

    Ok(workspace)
}

fn convert_viewer_object(viewer: Map<String, Value>, options: ConvertOptions) -> Map<String, Value> {
    let mut viewer = steps::upgrade(viewer);

    if options.replace_defaults {
        viewer.insert("version".into(), Value::from(CURRENT_VERSION));
        for (key, default) in steps::COLLECTION_DEFAULTS {
            match viewer.get_mut(*key) {
                Some(value) if !value.is_null() => {}
                Some(value) => *value = default(),
                None => {
                    viewer.insert(key.to_string(), default());
                }
            }
        }
        viewer = reorder(viewer, VIEWER_KEY_ORDER);
    }

    viewer
}

fn reorder(mut object: Map<String, Value>, order: &[&str]) -> Map<String, Value> {
    let mut ordered = Map::new();
    for key in order {
        if let Some(value) = object.remove(*key) {
            ordered.insert(key.to_string(), value);
        }
    }
    ordered.extend(object);
    ordered
}

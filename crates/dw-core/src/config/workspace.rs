//! Whole-workspace configuration and its validation

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::layout::{AreaNode, DetailArea, MasterArea};
use super::widget::WidgetConfig;
use crate::error::{Result, WorkspaceError};

/// How selections in one widget propagate to others
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkMode {
    /// Grouped widgets filter every other widget on the same table
    GlobalFilters,
    /// Only widgets flagged `linked` on the same table participate
    Linked,
}

/// Serializable description of a complete workspace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Relative sizes of the master and detail regions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<MasterArea>,

    #[serde(default)]
    pub detail: DetailArea,

    #[serde(default)]
    pub viewers: IndexMap<String, WidgetConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<LinkMode>,
}

impl WorkspaceConfig {
    /// Widget names in the master area
    pub fn master_widgets(&self) -> &[String] {
        self.master.as_ref().map(|m| m.widgets.as_slice()).unwrap_or(&[])
    }

    /// Widget names in the detail tree, depth first
    pub fn detail_widgets(&self) -> Vec<&str> {
        self.detail.main.as_ref().map(AreaNode::widgets).unwrap_or_default()
    }

    /// Every widget name that should be live: master first, then detail
    pub fn widget_names(&self) -> IndexSet<String> {
        self.master_widgets()
            .iter()
            .map(String::as_str)
            .chain(self.detail_widgets())
            .map(str::to_owned)
            .collect()
    }

    /// Check referential integrity and structural invariants
    ///
    /// Master and detail share one name space: a widget may appear once
    /// across both trees.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        if let Some(master) = &self.master {
            check_sizes("master", master.sizes.as_deref(), master.widgets.len())?;
            for name in &master.widgets {
                if !seen.insert(name.as_str()) {
                    return Err(config_error(format!("widget `{}` appears more than once", name)));
                }
            }
        }

        if let Some(main) = &self.detail.main {
            validate_area(main, &mut seen)?;
        }

        for name in seen {
            if !self.viewers.contains_key(name) {
                return Err(config_error(format!("widget `{}` has no entry in viewers", name)));
            }
        }

        Ok(())
    }
}

fn validate_area<'a>(node: &'a AreaNode, seen: &mut HashSet<&'a str>) -> Result<()> {
    match node {
        AreaNode::SplitArea(split) => {
            check_sizes("split-area", split.sizes.as_deref(), split.children.len())?;
            for child in &split.children {
                validate_area(child, seen)?;
            }
        }
        AreaNode::TabArea(tabs) => {
            if tabs.current_index >= tabs.widgets.len() {
                return Err(config_error(format!(
                    "tab-area currentIndex {} out of range for {} widget(s)",
                    tabs.current_index,
                    tabs.widgets.len()
                )));
            }
            for name in &tabs.widgets {
                if !seen.insert(name.as_str()) {
                    return Err(config_error(format!("widget `{}` appears more than once", name)));
                }
            }
        }
    }
    Ok(())
}

fn check_sizes(area: &str, sizes: Option<&[f64]>, expected: usize) -> Result<()> {
    match sizes {
        Some(sizes) if sizes.len() != expected => Err(config_error(format!(
            "{} has {} size(s) for {} child(ren)",
            area,
            sizes.len(),
            expected
        ))),
        _ => Ok(()),
    }
}

fn config_error(message: String) -> WorkspaceError {
    WorkspaceError::Config(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Orientation;
    use serde_json::json;

    fn two_tabs() -> WorkspaceConfig {
        let mut config = WorkspaceConfig {
            detail: DetailArea {
                main: Some(AreaNode::split(
                    Orientation::Horizontal,
                    vec![AreaNode::tabs(["One"], 0), AreaNode::tabs(["Two"], 0)],
                    Some(vec![0.5, 0.5]),
                )),
            },
            ..Default::default()
        };
        config.viewers.insert("One".into(), WidgetConfig::for_table("superstore"));
        config.viewers.insert("Two".into(), WidgetConfig::for_table("superstore"));
        config
    }

    #[test]
    fn test_valid_config() {
        let config = two_tabs();
        assert!(config.validate().is_ok());
        let names: Vec<_> = config.widget_names().into_iter().collect();
        assert_eq!(names, vec!["One".to_string(), "Two".to_string()]);
    }

    #[test]
    fn test_dangling_reference() {
        let mut config = two_tabs();
        config.viewers.shift_remove("Two");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("`Two`"));
    }

    #[test]
    fn test_duplicate_name_within_detail() {
        let mut config = two_tabs();
        config.detail.main = Some(AreaNode::split(
            Orientation::Vertical,
            vec![AreaNode::tabs(["One"], 0), AreaNode::tabs(["One", "Two"], 0)],
            None,
        ));
        assert!(matches!(config.validate(), Err(WorkspaceError::Config(_))));
    }

    #[test]
    fn test_duplicate_name() {
        let mut config = two_tabs();
        config.master = Some(MasterArea {
            widgets: vec!["One".into()],
            sizes: None,
        });
        assert!(matches!(config.validate(), Err(WorkspaceError::Config(_))));
    }

    #[test]
    fn test_current_index_out_of_range() {
        let mut config = two_tabs();
        config.detail.main = Some(AreaNode::tabs(["One", "Two"], 2));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sizes_length_mismatch() {
        let mut config = two_tabs();
        if let Some(AreaNode::SplitArea(split)) = config.detail.main.as_mut() {
            split.sizes = Some(vec![1.0]);
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_wire_format() {
        let config: WorkspaceConfig = serde_json::from_value(json!({
            "detail": {"main": null},
            "viewers": {},
            "mode": "globalFilters",
        }))
        .unwrap();
        assert_eq!(config.mode, Some(LinkMode::GlobalFilters));
        assert!(config.widget_names().is_empty());
    }
}

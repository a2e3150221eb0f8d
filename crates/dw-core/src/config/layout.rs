//! Serializable layout description: split and tab areas

use serde::{Deserialize, Serialize};

/// Direction in which a split area lays out its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A resizable split of child areas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitArea {
    pub orientation: Orientation,
    pub children: Vec<AreaNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<f64>>,
}

/// A tabbed group of widgets, exactly one of which is shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabArea {
    pub widgets: Vec<String>,
    #[serde(rename = "currentIndex", default)]
    pub current_index: usize,
}

/// A node of the `detail` layout tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AreaNode {
    SplitArea(SplitArea),
    TabArea(TabArea),
}

impl AreaNode {
    /// Build a split area node
    pub fn split(orientation: Orientation, children: Vec<AreaNode>, sizes: Option<Vec<f64>>) -> Self {
        AreaNode::SplitArea(SplitArea {
            orientation,
            children,
            sizes,
        })
    }

    /// Build a tab area node
    pub fn tabs<S: Into<String>>(widgets: impl IntoIterator<Item = S>, current_index: usize) -> Self {
        AreaNode::TabArea(TabArea {
            widgets: widgets.into_iter().map(Into::into).collect(),
            current_index,
        })
    }

    /// All widget names in this subtree, depth first
    pub fn widgets(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_widgets(&mut names);
        names
    }

    fn collect_widgets<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            AreaNode::SplitArea(split) => {
                for child in &split.children {
                    child.collect_widgets(names);
                }
            }
            AreaNode::TabArea(tabs) => names.extend(tabs.widgets.iter().map(String::as_str)),
        }
    }
}

/// The always-visible master region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterArea {
    pub widgets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<f64>>,
}

/// The tabbed/split detail region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailArea {
    #[serde(default)]
    pub main: Option<AreaNode>,
}

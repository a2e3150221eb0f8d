//! Live layout tree and its reconciliation against a target description
//!
//! The live tree mirrors `detail.main` and `master` with stable node ids so
//! the host can keep its containers across restores. Reconciling produces
//! the next tree plus a [`LayoutPatch`]: structural operations first, then
//! size and tab-index operations.

use dw_core::{AreaNode, MasterArea, Orientation, SplitArea, TabArea};
use uuid::Uuid;

/// Stable identity of a live container
pub type NodeId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Split(Orientation),
    Tabs,
    Master,
}

/// One instruction for the GUI host
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOp {
    /// Create an empty container; `parent: None` makes it a root
    CreateContainer {
        id: NodeId,
        kind: ContainerKind,
        parent: Option<NodeId>,
        index: usize,
    },
    /// Remove a container and every container below it
    RemoveContainer { id: NodeId },
    /// Place a widget, moving it if it is attached elsewhere
    Attach { widget: String, parent: NodeId, index: usize },
    /// Take a widget off screen
    Detach { widget: String },
    ApplySizes { id: NodeId, sizes: Vec<f64> },
    SetCurrent { id: NodeId, index: usize },
}

/// Operations produced by one reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPatch {
    pub structure: Vec<LayoutOp>,
    pub geometry: Vec<LayoutOp>,
}

impl LayoutPatch {
    pub fn detach(&mut self, widget: impl Into<String>) {
        self.structure.push(LayoutOp::Detach { widget: widget.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.structure.is_empty() && self.geometry.is_empty()
    }

    /// Structural operations followed by geometry operations
    pub fn into_ops(self) -> Vec<LayoutOp> {
        let mut ops = self.structure;
        ops.extend(self.geometry);
        ops
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitNode {
    pub id: NodeId,
    pub orientation: Orientation,
    pub children: Vec<LayoutNode>,
    pub sizes: Option<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabsNode {
    pub id: NodeId,
    pub widgets: Vec<String>,
    pub current_index: usize,
}

/// A live container of the detail tree
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutNode {
    Split(SplitNode),
    Tabs(TabsNode),
}

/// The live master area
#[derive(Debug, Clone, PartialEq)]
pub struct MasterNode {
    pub id: NodeId,
    pub widgets: Vec<String>,
    pub sizes: Option<Vec<f64>>,
}

impl LayoutNode {
    pub fn id(&self) -> NodeId {
        match self {
            LayoutNode::Split(node) => node.id,
            LayoutNode::Tabs(node) => node.id,
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            LayoutNode::Split(node) => ContainerKind::Split(node.orientation),
            LayoutNode::Tabs(_) => ContainerKind::Tabs,
        }
    }

    /// Build a fresh subtree for `area`, recording its creation in `patch`
    fn build(area: &AreaNode, parent: Option<NodeId>, index: usize, patch: &mut LayoutPatch) -> LayoutNode {
        let id = Uuid::new_v4();
        patch.structure.push(LayoutOp::CreateContainer {
            id,
            kind: area_kind(area),
            parent,
            index,
        });

        match area {
            AreaNode::SplitArea(split) => {
                let children = split
                    .children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| LayoutNode::build(child, Some(id), i, patch))
                    .collect();
                if let Some(sizes) = &split.sizes {
                    patch.geometry.push(LayoutOp::ApplySizes { id, sizes: sizes.clone() });
                }
                LayoutNode::Split(SplitNode {
                    id,
                    orientation: split.orientation,
                    children,
                    sizes: split.sizes.clone(),
                })
            }
            AreaNode::TabArea(tabs) => {
                attach_all(id, &tabs.widgets, patch);
                patch.geometry.push(LayoutOp::SetCurrent {
                    id,
                    index: tabs.current_index,
                });
                LayoutNode::Tabs(TabsNode {
                    id,
                    widgets: tabs.widgets.clone(),
                    current_index: tabs.current_index,
                })
            }
        }
    }

    /// Same container type and, for splits, the same ordered child types
    fn reusable_for(&self, target: &AreaNode) -> bool {
        match (self, target) {
            (LayoutNode::Split(node), AreaNode::SplitArea(area)) => {
                node.orientation == area.orientation
                    && node.children.len() == area.children.len()
                    && node
                        .children
                        .iter()
                        .zip(&area.children)
                        .all(|(child, target)| child.kind() == area_kind(target))
            }
            (LayoutNode::Tabs(_), AreaNode::TabArea(_)) => true,
            _ => false,
        }
    }

    fn reconcile(self, target: &AreaNode, parent: Option<NodeId>, index: usize, patch: &mut LayoutPatch) -> LayoutNode {
        if !self.reusable_for(target) {
            patch.structure.push(LayoutOp::RemoveContainer { id: self.id() });
            return LayoutNode::build(target, parent, index, patch);
        }

        match (self, target) {
            (LayoutNode::Split(node), AreaNode::SplitArea(area)) => {
                let id = node.id;
                let children = node
                    .children
                    .into_iter()
                    .zip(&area.children)
                    .enumerate()
                    .map(|(i, (child, target))| child.reconcile(target, Some(id), i, patch))
                    .collect();
                if node.sizes != area.sizes {
                    if let Some(sizes) = &area.sizes {
                        patch.geometry.push(LayoutOp::ApplySizes { id, sizes: sizes.clone() });
                    }
                }
                LayoutNode::Split(SplitNode {
                    id,
                    orientation: area.orientation,
                    children,
                    sizes: area.sizes.clone(),
                })
            }
            (LayoutNode::Tabs(node), AreaNode::TabArea(area)) => {
                attach_changed(node.id, &node.widgets, &area.widgets, patch);
                if node.current_index != area.current_index {
                    patch.geometry.push(LayoutOp::SetCurrent {
                        id: node.id,
                        index: area.current_index,
                    });
                }
                LayoutNode::Tabs(TabsNode {
                    id: node.id,
                    widgets: area.widgets.clone(),
                    current_index: area.current_index,
                })
            }
            (_, target) => LayoutNode::build(target, parent, index, patch),
        }
    }

    /// Convert back to the serializable description
    pub fn to_area(&self) -> AreaNode {
        match self {
            LayoutNode::Split(node) => AreaNode::SplitArea(SplitArea {
                orientation: node.orientation,
                children: node.children.iter().map(LayoutNode::to_area).collect(),
                sizes: node.sizes.clone(),
            }),
            LayoutNode::Tabs(node) => AreaNode::TabArea(TabArea {
                widgets: node.widgets.clone(),
                current_index: node.current_index,
            }),
        }
    }

    /// Container holding `widget` and its index there
    pub fn locate(&self, widget: &str) -> Option<(NodeId, usize)> {
        match self {
            LayoutNode::Split(node) => node.children.iter().find_map(|child| child.locate(widget)),
            LayoutNode::Tabs(node) => node
                .widgets
                .iter()
                .position(|name| name == widget)
                .map(|index| (node.id, index)),
        }
    }

    /// Widgets shown on screen: every split child, one widget per tab area
    pub fn visible_widgets(&self) -> Vec<&str> {
        let mut visible = Vec::new();
        self.collect_visible(&mut visible);
        visible
    }

    fn collect_visible<'a>(&'a self, visible: &mut Vec<&'a str>) {
        match self {
            LayoutNode::Split(node) => {
                for child in &node.children {
                    child.collect_visible(visible);
                }
            }
            LayoutNode::Tabs(node) => {
                if let Some(widget) = node.widgets.get(node.current_index) {
                    visible.push(widget);
                }
            }
        }
    }
}

impl MasterNode {
    fn build(area: &MasterArea, patch: &mut LayoutPatch) -> MasterNode {
        let id = Uuid::new_v4();
        patch.structure.push(LayoutOp::CreateContainer {
            id,
            kind: ContainerKind::Master,
            parent: None,
            index: 0,
        });
        attach_all(id, &area.widgets, patch);
        if let Some(sizes) = &area.sizes {
            patch.geometry.push(LayoutOp::ApplySizes { id, sizes: sizes.clone() });
        }
        MasterNode {
            id,
            widgets: area.widgets.clone(),
            sizes: area.sizes.clone(),
        }
    }

    fn reconcile(self, area: &MasterArea, patch: &mut LayoutPatch) -> MasterNode {
        attach_changed(self.id, &self.widgets, &area.widgets, patch);
        if self.sizes != area.sizes {
            if let Some(sizes) = &area.sizes {
                patch.geometry.push(LayoutOp::ApplySizes {
                    id: self.id,
                    sizes: sizes.clone(),
                });
            }
        }
        MasterNode {
            id: self.id,
            widgets: area.widgets.clone(),
            sizes: area.sizes.clone(),
        }
    }
}

fn area_kind(area: &AreaNode) -> ContainerKind {
    match area {
        AreaNode::SplitArea(split) => ContainerKind::Split(split.orientation),
        AreaNode::TabArea(_) => ContainerKind::Tabs,
    }
}

fn attach_all(parent: NodeId, widgets: &[String], patch: &mut LayoutPatch) {
    for (index, widget) in widgets.iter().enumerate() {
        patch.structure.push(LayoutOp::Attach {
            widget: widget.clone(),
            parent,
            index,
        });
    }
}

fn attach_changed(parent: NodeId, previous: &[String], widgets: &[String], patch: &mut LayoutPatch) {
    for (index, widget) in widgets.iter().enumerate() {
        if previous.get(index) != Some(widget) {
            patch.structure.push(LayoutOp::Attach {
                widget: widget.clone(),
                parent,
                index,
            });
        }
    }
}

/// The whole live layout: master area and detail tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutTree {
    pub master: Option<MasterNode>,
    pub detail: Option<LayoutNode>,
}

impl LayoutTree {
    /// Move the tree to the target shape, appending the host operations to
    /// `patch`. Containers whose type and child types are unchanged keep
    /// their ids.
    pub fn reconcile(&mut self, master: Option<&MasterArea>, detail: Option<&AreaNode>, patch: &mut LayoutPatch) {
        self.master = match (self.master.take(), master) {
            (Some(node), Some(area)) => Some(node.reconcile(area, patch)),
            (Some(node), None) => {
                patch.structure.push(LayoutOp::RemoveContainer { id: node.id });
                None
            }
            (None, Some(area)) => Some(MasterNode::build(area, patch)),
            (None, None) => None,
        };

        self.detail = match (self.detail.take(), detail) {
            (Some(node), Some(area)) => Some(node.reconcile(area, None, 0, patch)),
            (Some(node), None) => {
                patch.structure.push(LayoutOp::RemoveContainer { id: node.id() });
                None
            }
            (None, Some(area)) => Some(LayoutNode::build(area, None, 0, patch)),
            (None, None) => None,
        };
    }

    /// Widgets that should be Visible: the whole master area plus the
    /// current tab of every tab area
    pub fn visible_widgets(&self) -> Vec<&str> {
        let mut visible: Vec<&str> = self
            .master
            .as_ref()
            .map(|master| master.widgets.iter().map(String::as_str).collect())
            .unwrap_or_default();
        if let Some(detail) = &self.detail {
            visible.extend(detail.visible_widgets());
        }
        visible
    }

    /// Container holding `widget` and its index there
    pub fn locate(&self, widget: &str) -> Option<(NodeId, usize)> {
        let in_master = self.master.as_ref().and_then(|master| {
            master
                .widgets
                .iter()
                .position(|name| name == widget)
                .map(|index| (master.id, index))
        });
        in_master.or_else(|| self.detail.as_ref().and_then(|detail| detail.locate(widget)))
    }

    pub fn detail_area(&self) -> Option<AreaNode> {
        self.detail.as_ref().map(LayoutNode::to_area)
    }
}

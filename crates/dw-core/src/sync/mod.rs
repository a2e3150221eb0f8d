//! Selection propagation between widgets that share a table

use serde_json::Value;

use crate::config::{FilterClause, LinkMode, WidgetConfig};

/// A user selection inside a grouped widget
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Group values of the selected row, outermost level first
    pub group_path: Vec<Value>,

    /// Columns under the cursor
    pub column_names: Vec<String>,
}

impl Selection {
    pub fn new(group_path: Vec<Value>) -> Self {
        Self {
            group_path,
            column_names: Vec::new(),
        }
    }
}

/// Gesture that produced a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionGesture {
    Click,
    Select { selected: bool },
}

/// Decides which gestures propagate and which widgets receive them
pub trait LinkPolicy: Send + Sync {
    fn mode(&self) -> LinkMode;

    /// Whether `gesture` drives propagation under this policy
    fn accepts(&self, gesture: SelectionGesture) -> bool;

    /// Whether `origin` may originate a selection
    fn is_origin(&self, origin: &WidgetConfig) -> bool;

    /// Whether `candidate` receives filters selected in `origin`
    fn is_target(&self, origin: &WidgetConfig, candidate: &WidgetConfig) -> bool;
}

/// Only widgets flagged `linked` on the origin's table participate
pub struct LinkedPolicy;

/// Every widget on the origin's table participates
pub struct GlobalFiltersPolicy;

impl LinkPolicy for LinkedPolicy {
    fn mode(&self) -> LinkMode {
        LinkMode::Linked
    }

    fn accepts(&self, gesture: SelectionGesture) -> bool {
        matches!(gesture, SelectionGesture::Select { .. })
    }

    fn is_origin(&self, origin: &WidgetConfig) -> bool {
        origin.linked && origin.is_grouped()
    }

    fn is_target(&self, origin: &WidgetConfig, candidate: &WidgetConfig) -> bool {
        candidate.linked && same_table(origin, candidate)
    }
}

impl LinkPolicy for GlobalFiltersPolicy {
    fn mode(&self) -> LinkMode {
        LinkMode::GlobalFilters
    }

    fn accepts(&self, gesture: SelectionGesture) -> bool {
        matches!(gesture, SelectionGesture::Click)
    }

    fn is_origin(&self, origin: &WidgetConfig) -> bool {
        origin.is_grouped()
    }

    fn is_target(&self, origin: &WidgetConfig, candidate: &WidgetConfig) -> bool {
        same_table(origin, candidate)
    }
}

fn same_table(a: &WidgetConfig, b: &WidgetConfig) -> bool {
    matches!((a.table_name(), b.table_name()), (Some(x), Some(y)) if x == y)
}

/// Policy implementing `mode`
pub fn policy_for(mode: LinkMode) -> &'static dyn LinkPolicy {
    match mode {
        LinkMode::Linked => &LinkedPolicy,
        LinkMode::GlobalFilters => &GlobalFiltersPolicy,
    }
}

/// Filter changes derived from one selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterUpdate {
    /// Clauses that replace any clause on the same column
    pub upserts: Vec<FilterClause>,

    /// Columns whose clauses are dropped
    pub removals: Vec<String>,
}

impl FilterUpdate {
    /// Derive the update for a selection in `origin`.
    ///
    /// Each grouping level covered by the selected path becomes an equality
    /// clause; deeper levels, or every level on deselect, are removed.
    /// Returns `None` for an ungrouped origin.
    pub fn from_selection(origin: &WidgetConfig, selection: &Selection, selected: bool) -> Option<Self> {
        if !origin.is_grouped() {
            return None;
        }

        let mut update = FilterUpdate::default();
        for (level, column) in origin.group_by.iter().enumerate() {
            match selection.group_path.get(level) {
                Some(value) if selected && !value.is_null() => {
                    update.upserts.push(FilterClause::equals(column.clone(), value.clone()));
                }
                _ => update.removals.push(column.clone()),
            }
        }

        Some(update)
    }

    /// Apply to `config`, returning whether its filters changed
    pub fn apply(&self, config: &mut WidgetConfig) -> bool {
        let before = config.filter.clone();
        for column in &self.removals {
            config.remove_filter(column);
        }
        for clause in &self.upserts {
            config.upsert_filter(clause.clone());
        }
        before != config.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grouped(table: &str, columns: &[&str]) -> WidgetConfig {
        WidgetConfig {
            table: Some(table.into()),
            group_by: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_selection_replaces_clause() {
        let origin = grouped("superstore", &["State"]);
        let mut target = WidgetConfig::for_table("superstore");
        target.filter = vec![FilterClause::equals("Category", "Office Supplies")];

        let update = FilterUpdate::from_selection(&origin, &Selection::new(vec![json!("Alabama")]), true).unwrap();
        assert!(update.apply(&mut target));
        assert_eq!(
            target.filter,
            vec![
                FilterClause::equals("Category", "Office Supplies"),
                FilterClause::equals("State", "Alabama"),
            ]
        );

        let update = FilterUpdate::from_selection(&origin, &Selection::new(vec![json!("Texas")]), true).unwrap();
        assert!(update.apply(&mut target));
        assert_eq!(target.filter.len(), 2);
        assert_eq!(target.filter[1], FilterClause::equals("State", "Texas"));
    }

    #[test]
    fn test_deselect_removes_without_append() {
        let origin = grouped("superstore", &["State"]);
        let mut target = WidgetConfig::for_table("superstore");
        target.filter = vec![FilterClause::equals("State", "Texas")];

        let update = FilterUpdate::from_selection(&origin, &Selection::new(vec![json!("Texas")]), false).unwrap();
        assert!(update.apply(&mut target));
        assert!(target.filter.is_empty());
    }

    #[test]
    fn test_partial_path_clears_deeper_levels() {
        let origin = grouped("superstore", &["Region", "State"]);
        let update = FilterUpdate::from_selection(&origin, &Selection::new(vec![json!("South")]), true).unwrap();
        assert_eq!(update.upserts, vec![FilterClause::equals("Region", "South")]);
        assert_eq!(update.removals, vec!["State".to_string()]);
    }

    #[test]
    fn test_ungrouped_origin_cannot_select() {
        let origin = WidgetConfig::for_table("superstore");
        assert!(FilterUpdate::from_selection(&origin, &Selection::default(), true).is_none());
        assert!(!policy_for(LinkMode::GlobalFilters).is_origin(&origin));
    }

    #[test]
    fn test_policies() {
        let mut origin = grouped("superstore", &["State"]);
        let mut other = WidgetConfig::for_table("superstore");
        let foreign = WidgetConfig::for_table("orders");

        let global = policy_for(LinkMode::GlobalFilters);
        assert!(global.accepts(SelectionGesture::Click));
        assert!(global.is_target(&origin, &other));
        assert!(!global.is_target(&origin, &foreign));

        let linked = policy_for(LinkMode::Linked);
        assert!(linked.accepts(SelectionGesture::Select { selected: true }));
        assert!(!linked.accepts(SelectionGesture::Click));
        assert!(!linked.is_origin(&origin));
        assert!(!linked.is_target(&origin, &other));

        origin.linked = true;
        other.linked = true;
        assert!(linked.is_origin(&origin));
        assert!(linked.is_target(&origin, &other));
    }
}

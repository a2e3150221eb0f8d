//! Linked-filter coordinator
//!
//! Turns a selection in one widget into filter clauses on the widgets that
//! share its table. Target configs are read from the viewers themselves,
//! merged, and pushed back through each viewer's `restore()`; once every
//! target has settled a single layout-update notification goes out.

use std::sync::Arc;

use futures::future::join_all;

use dw_core::events::events::{LayoutUpdateReason, LayoutUpdated, ViewerClicked, ViewerConfigUpdated, ViewerSelected};
use dw_core::sync::policy_for;
use dw_core::{EventBus, FilterUpdate, LinkMode, Selection, SelectionGesture, WidgetConfig};
use dw_views::{DrawKind, Viewer, ViewerEvent, ViewerMessage};

use crate::reconciler::Reconciler;

/// Handle one event from a viewer: forward it on the bus, then propagate
/// selections under `mode`
pub(crate) async fn handle_viewer_event(reconciler: &mut Reconciler, bus: &EventBus, mode: LinkMode, message: ViewerMessage) {
    let current = reconciler
        .live
        .get(&message.widget)
        .map_or(false, |live| live.redraw.generation() == message.generation);
    if !current {
        tracing::trace!(widget = %message.widget, generation = message.generation, "event from stale widget ignored");
        return;
    }

    let widget = message.widget;
    let (selection, gesture) = match message.event {
        ViewerEvent::Click(selection) => {
            bus.publish(ViewerClicked {
                widget: widget.clone(),
                selection: selection.clone(),
            });
            (selection, SelectionGesture::Click)
        }
        ViewerEvent::Select { selection, selected } => {
            bus.publish(ViewerSelected {
                widget: widget.clone(),
                selection: selection.clone(),
                selected,
            });
            (selection, SelectionGesture::Select { selected })
        }
        ViewerEvent::ConfigUpdate(config) => {
            if let Some(live) = reconciler.live.get_mut(&widget) {
                live.applied = config.clone();
            }
            reconciler.viewers.insert(widget.clone(), config.clone());
            bus.publish(ViewerConfigUpdated { widget, config });
            return;
        }
    };

    if propagate(reconciler, &widget, &selection, gesture, mode).await {
        bus.publish(LayoutUpdated {
            reason: LayoutUpdateReason::LinkedFilter,
        });
    }
}

/// Apply the filters derived from a selection in `origin` to every target.
///
/// Returns whether any target's filters changed.
pub(crate) async fn propagate(
    reconciler: &mut Reconciler,
    origin: &str,
    selection: &Selection,
    gesture: SelectionGesture,
    mode: LinkMode,
) -> bool {
    let policy = policy_for(mode);
    if !policy.accepts(gesture) {
        return false;
    }

    let Some(origin_config) = reconciler.live.get(origin).map(|live| live.applied.clone()) else {
        return false;
    };
    if !policy.is_origin(&origin_config) {
        tracing::debug!(widget = origin, ?mode, "widget cannot originate a selection");
        return false;
    }

    let selected = match gesture {
        SelectionGesture::Click => true,
        SelectionGesture::Select { selected } => selected,
    };
    let Some(update) = FilterUpdate::from_selection(&origin_config, selection, selected) else {
        return false;
    };

    let targets: Vec<(String, Arc<dyn Viewer>, WidgetConfig)> = reconciler
        .live
        .iter()
        .filter(|(name, live)| name.as_str() != origin && policy.is_target(&origin_config, &live.applied))
        .map(|(name, live)| (name.clone(), live.viewer.clone(), live.applied.clone()))
        .collect();

    let saved = join_all(targets.into_iter().map(|(name, viewer, applied)| async move {
        let config = match viewer.save().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(widget = %name, "viewer save failed, using last applied config: {:#}", e);
                applied
            }
        };
        (name, viewer, config)
    }))
    .await;

    let changed: Vec<(String, Arc<dyn Viewer>, WidgetConfig)> = saved
        .into_iter()
        .filter_map(|(name, viewer, mut config)| update.apply(&mut config).then(|| (name, viewer, config)))
        .collect();
    if changed.is_empty() {
        return false;
    }

    join_all(changed.iter().map(|(name, viewer, config)| async move {
        if let Err(e) = viewer.restore(config).await {
            tracing::warn!(widget = %name, "linked filter restore failed: {:#}", e);
        }
    }))
    .await;

    for (name, _, config) in changed {
        if let Some(live) = reconciler.live.get_mut(&name) {
            live.applied = config.clone();
        }
        reconciler.scheduler.request(&name, DrawKind::Draw);
        reconciler.viewers.insert(name, config);
    }

    tracing::debug!(origin, ?mode, "linked filter applied");
    true
}

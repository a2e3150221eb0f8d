//! Layout reconciler - moves the live widget set to a target config
//!
//! The reconciler owns every live widget. A restore validates the whole
//! target first, tears down widgets that left the layout, creates or
//! updates the rest, reconciles the container tree and finally applies
//! tab visibility. Draws never run here: they go through the
//! [`VisibilityScheduler`], which drops them once a widget is unmounted.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use dw_core::{
    AreaNode, Result, SubscriptionId, TableRef, WidgetConfig, WorkspaceConfig, WorkspaceError,
    WorkspaceSettings,
};
use dw_data::TableRegistry;
use dw_views::{
    DrawKind, EventSink, Generation, LayoutHost, LayoutOp, LayoutPatch, LayoutTree, PluginRegistry, Redraw, Viewer,
    ViewerContext, ViewerMessage, Visibility, VisibilityScheduler,
};

/// Table a widget is currently loaded with
struct Loaded {
    table: TableRef,
    subscription: SubscriptionId,
}

#[derive(Default)]
struct BindState {
    /// Bumped by every bind and unbind; a bind task only commits if its
    /// sequence number is still the latest
    seq: u64,
    loaded: Option<Loaded>,
    /// Bind task still waiting for its table; cleared once loading starts
    resolving: Option<AbortHandle>,
}

/// Binding state shared with in-flight bind tasks
#[derive(Default)]
pub(crate) struct Binding {
    state: Mutex<BindState>,
}

impl Binding {
    fn unbind(&self) {
        let mut state = self.state.lock();
        state.seq += 1;
        if let Some(resolving) = state.resolving.take() {
            resolving.abort();
        }
        if let Some(loaded) = state.loaded.take() {
            loaded.table.remove_update(loaded.subscription);
        }
    }

    fn is_bound(&self) -> bool {
        self.state.lock().loaded.is_some()
    }
}

pub(crate) struct LiveWidget {
    pub(crate) viewer: Arc<dyn Viewer>,
    pub(crate) redraw: Redraw,
    pub(crate) plugin: String,
    /// Config most recently pushed to the viewer
    pub(crate) applied: WidgetConfig,
    binding: Arc<Binding>,
}

/// Outcome of applying one widget config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Unchanged,
    Updated,
    Created,
    /// Plugin changed: old instance torn down, new one created
    Recreated,
}

struct PendingBind {
    table: String,
    handle: JoinHandle<()>,
}

/// Introspection snapshot of one widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetState {
    pub visibility: Visibility,
    pub generation: Generation,
    pub plugin: String,
    /// A table handle is loaded into the viewer
    pub bound: bool,
    /// The last draw failed
    pub stale: bool,
}

pub(crate) struct Reconciler {
    plugins: PluginRegistry,
    settings: WorkspaceSettings,
    tables: TableRegistry,
    pub(crate) scheduler: VisibilityScheduler,
    host: Arc<dyn LayoutHost>,
    events: mpsc::UnboundedSender<ViewerMessage>,
    pub(crate) live: IndexMap<String, LiveWidget>,
    tree: LayoutTree,
    /// Every config entry of the last restore, live or not
    pub(crate) viewers: IndexMap<String, WidgetConfig>,
    binds: Vec<PendingBind>,
    disposals: Vec<JoinHandle<()>>,
    attached: bool,
}

impl Reconciler {
    pub(crate) fn new(
        plugins: PluginRegistry,
        settings: WorkspaceSettings,
        tables: TableRegistry,
        host: Arc<dyn LayoutHost>,
        events: mpsc::UnboundedSender<ViewerMessage>,
    ) -> Self {
        Self {
            plugins,
            settings,
            tables,
            scheduler: VisibilityScheduler::new(),
            host,
            events,
            live: IndexMap::new(),
            tree: LayoutTree::default(),
            viewers: IndexMap::new(),
            binds: Vec::new(),
            disposals: Vec::new(),
            attached: true,
        }
    }

    pub(crate) fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    /// Apply `config`. Returns whether the layout structure changed.
    ///
    /// Validation covers the whole config before anything is touched, so a
    /// rejected call leaves the workspace as it was.
    pub(crate) async fn restore(&mut self, config: &WorkspaceConfig) -> Result<bool> {
        config.validate()?;
        let target = config.widget_names();
        if !target.is_empty() && self.plugins.is_empty() {
            return Err(WorkspaceError::Plugin("no plugins registered".into()));
        }

        self.binds.retain(|bind| !bind.handle.is_finished());
        self.disposals.retain(|disposal| !disposal.is_finished());

        let mut patch = LayoutPatch::default();
        let removed: Vec<String> = self.live.keys().filter(|name| !target.contains(*name)).cloned().collect();
        for name in &removed {
            patch.detach(name.as_str());
            self.teardown(name);
        }

        let mut touched = Vec::new();
        let mut recreated = Vec::new();
        for name in &target {
            let Some(widget_config) = config.viewers.get(name) else {
                continue;
            };
            match self.apply_widget(name, widget_config).await? {
                Applied::Unchanged => {}
                Applied::Recreated => {
                    patch.detach(name.as_str());
                    recreated.push(name.clone());
                    touched.push(name.clone());
                }
                Applied::Updated | Applied::Created => touched.push(name.clone()),
            }
        }

        self.tree
            .reconcile(config.master.as_ref(), config.detail.main.as_ref(), &mut patch);
        for name in &recreated {
            let attached = patch
                .structure
                .iter()
                .any(|op| matches!(op, LayoutOp::Attach { widget, .. } if widget == name));
            if let (false, Some((parent, index))) = (attached, self.tree.locate(name)) {
                patch.structure.push(LayoutOp::Attach {
                    widget: name.clone(),
                    parent,
                    index,
                });
            }
        }
        let structural = !patch.structure.is_empty();
        if !patch.is_empty() {
            if let Err(e) = self.host.apply(&patch.into_ops()).await {
                tracing::warn!("layout host rejected patch: {:#}", e);
            }
        }

        self.viewers = config.viewers.clone();
        self.apply_visibility();
        for name in &touched {
            self.scheduler.request(name, DrawKind::Draw);
        }

        tracing::debug!(
            live = self.live.len(),
            removed = removed.len(),
            touched = touched.len(),
            structural,
            "restore applied"
        );
        Ok(structural)
    }

    /// Create or update one widget
    async fn apply_widget(&mut self, name: &str, config: &WidgetConfig) -> Result<Applied> {
        let plugin = self.plugin_name(config)?;
        let existing = self.live.get(name).map(|live| live.plugin.clone());

        match existing {
            None => {
                self.create(name, config).await?;
                Ok(Applied::Created)
            }
            Some(existing) if existing != plugin => {
                tracing::debug!(widget = name, from = %existing, to = %plugin, "plugin changed, recreating widget");
                self.teardown(name);
                self.create(name, config).await?;
                Ok(Applied::Recreated)
            }
            Some(_) => {
                let Some(live) = self.live.get_mut(name) else {
                    return Ok(Applied::Unchanged);
                };
                if live.applied == *config {
                    return Ok(Applied::Unchanged);
                }

                let rebind = live.applied.table != config.table;
                if let Err(e) = live.viewer.restore(config).await {
                    tracing::warn!(widget = name, "viewer restore failed: {:#}", e);
                }
                live.applied = config.clone();

                if rebind {
                    live.binding.unbind();
                    if let Some(table) = config.table_name() {
                        self.binds.push(spawn_bind(&self.tables, live, table));
                    }
                }
                Ok(Applied::Updated)
            }
        }
    }

    fn plugin_name(&self, config: &WidgetConfig) -> Result<String> {
        let requested = config.plugin.as_deref().or(self.settings.default_plugin.as_deref());
        Ok(self.plugins.resolve(requested)?.name.clone())
    }

    async fn create(&mut self, name: &str, config: &WidgetConfig) -> Result<()> {
        let requested = config.plugin.as_deref().or(self.settings.default_plugin.as_deref());
        let descriptor = self.plugins.resolve(requested)?;

        let redraw = self.scheduler.mount(name);
        let context = ViewerContext {
            name: name.to_string(),
            events: EventSink::new(name, redraw.generation(), self.events.clone()),
            redraw: redraw.clone(),
        };
        let viewer = descriptor.build(context);
        self.scheduler.install(&redraw, viewer.clone());

        let live = LiveWidget {
            viewer,
            redraw,
            plugin: descriptor.name.clone(),
            applied: config.clone(),
            binding: Arc::new(Binding::default()),
        };
        tracing::debug!(widget = name, plugin = %live.plugin, generation = live.redraw.generation(), "created widget");

        if let Some(table) = config.table_name() {
            self.binds.push(spawn_bind(&self.tables, &live, table));
        }
        if let Err(e) = live.viewer.restore(config).await {
            tracing::warn!(widget = name, "viewer restore failed: {:#}", e);
        }

        self.live.insert(name.to_string(), live);
        Ok(())
    }

    /// Remove a widget: unbind, unmount and dispose in the background
    fn teardown(&mut self, name: &str) {
        let Some(live) = self.live.shift_remove(name) else {
            return;
        };
        live.binding.unbind();

        if let Some(teardown) = self.scheduler.unmount(name) {
            let timeout = self.settings.disposal_timeout;
            self.disposals.push(tokio::spawn(teardown.dispose(timeout)));
        }
    }

    /// Tear down every widget and drop the layout
    pub(crate) async fn clear(&mut self) {
        let names: Vec<String> = self.live.keys().cloned().collect();
        let mut patch = LayoutPatch::default();
        for name in &names {
            patch.detach(name.as_str());
            self.teardown(name);
        }
        self.tree.reconcile(None, None, &mut patch);
        if !patch.is_empty() {
            if let Err(e) = self.host.apply(&patch.into_ops()).await {
                tracing::warn!("layout host rejected patch: {:#}", e);
            }
        }
        self.viewers.clear();
    }

    /// Bring each widget's visibility in line with the tree
    pub(crate) fn apply_visibility(&self) {
        let visible: HashSet<&str> = if self.attached {
            self.tree.visible_widgets().into_iter().collect()
        } else {
            HashSet::new()
        };
        for name in self.live.keys() {
            self.scheduler.set_visible(name, visible.contains(name.as_str()));
        }
    }

    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
        self.apply_visibility();
    }

    /// A table was (re)registered: rebind the widgets that reference it
    pub(crate) fn on_table_set(&mut self, table: &str) {
        for (name, live) in &self.live {
            if live.applied.table_name() == Some(table) {
                tracing::debug!(widget = %name, table, "rebinding after table set");
                self.binds.push(spawn_bind(&self.tables, live, table));
            }
        }
    }

    /// Wait for bind tasks, pending disposals and queued draws
    pub(crate) async fn flush(&mut self) {
        let binds: Vec<JoinHandle<()>> = self.binds.drain(..).map(|bind| bind.handle).collect();
        log_join_errors(join_all(binds).await);
        log_join_errors(join_all(self.disposals.drain(..)).await);
        self.scheduler.barrier().await;
    }

    /// Wait for the bind tasks of one table
    pub(crate) async fn settle_table(&mut self, table: &str) {
        let (settling, rest): (Vec<PendingBind>, Vec<PendingBind>) =
            self.binds.drain(..).partition(|bind| bind.table == table);
        self.binds = rest;
        log_join_errors(join_all(settling.into_iter().map(|bind| bind.handle)).await);
    }

    pub(crate) async fn resize(&self) {
        if let Err(e) = self.host.resize().await {
            tracing::warn!("layout host resize failed: {:#}", e);
        }
        self.scheduler.request_visible(DrawKind::Resize);
        self.scheduler.barrier().await;
    }

    /// Current viewer configs, read back from each live viewer
    pub(crate) async fn save_viewers(&self) -> IndexMap<String, WidgetConfig> {
        let saved = join_all(self.live.iter().map(|(name, live)| async move {
            let config = match live.viewer.save().await {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(widget = %name, "viewer save failed, using last applied config: {:#}", e);
                    live.applied.clone()
                }
            };
            (name.clone(), config)
        }))
        .await;

        let mut viewers = self.viewers.clone();
        for (name, config) in saved {
            viewers.insert(name, config);
        }
        viewers
    }

    pub(crate) fn detail_area(&self) -> Option<AreaNode> {
        self.tree.detail_area()
    }

    pub(crate) fn widget_state(&self, name: &str) -> Option<WidgetState> {
        let live = self.live.get(name)?;
        Some(WidgetState {
            visibility: self.scheduler.visibility(name),
            generation: live.redraw.generation(),
            plugin: live.plugin.clone(),
            bound: live.binding.is_bound(),
            stale: self.scheduler.is_stale(name),
        })
    }
}

fn log_join_errors(results: Vec<std::result::Result<(), tokio::task::JoinError>>) {
    for result in results {
        match result {
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("background task failed: {}", e),
            Ok(()) => {}
        }
    }
}

/// Spawn a bind task, superseding any earlier one for the same widget.
///
/// The binding stays locked until the abort handle is recorded, so the task
/// cannot start loading before it becomes cancellable.
fn spawn_bind(tables: &TableRegistry, live: &LiveWidget, table: &str) -> PendingBind {
    let mut state = live.binding.state.lock();
    state.seq += 1;
    if let Some(resolving) = state.resolving.take() {
        resolving.abort();
    }

    let handle = tokio::spawn(bind(
        tables.clone(),
        table.to_string(),
        live.viewer.clone(),
        live.redraw.clone(),
        live.binding.clone(),
        state.seq,
    ));
    state.resolving = Some(handle.abort_handle());
    drop(state);

    PendingBind {
        table: table.to_string(),
        handle,
    }
}

fn same_table(a: &TableRef, b: &TableRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Resolve `table` and load it into the viewer.
///
/// Loading the handle the viewer already has is a no-op. A table that is
/// not registered yet leaves the widget pending until it is set. While the
/// task waits for the table it is aborted by a newer bind or an unbind;
/// once loading starts it runs to completion and only commits if it is
/// still the latest bind.
async fn bind(
    tables: TableRegistry,
    table: String,
    viewer: Arc<dyn Viewer>,
    redraw: Redraw,
    binding: Arc<Binding>,
    seq: u64,
) {
    let handle = match tables.resolve(&table).await {
        Ok(handle) => handle,
        Err(WorkspaceError::UnknownTable(_)) => {
            tracing::debug!(widget = redraw.widget(), table = %table, "table not registered, widget pending");
            return;
        }
        Err(e) => {
            tracing::warn!(widget = redraw.widget(), table = %table, "bind failed: {}", e);
            return;
        }
    };

    {
        let mut state = binding.state.lock();
        if state.seq != seq || !redraw.is_current() {
            return;
        }
        state.resolving = None;
        if let Some(loaded) = state.loaded.as_ref() {
            if same_table(&loaded.table, &handle) {
                tracing::trace!(widget = redraw.widget(), table = %table, "already bound");
                return;
            }
        }
    }

    if let Err(e) = viewer.load(handle.clone()).await {
        tracing::warn!(widget = redraw.widget(), table = %table, "viewer load failed: {:#}", e);
        return;
    }

    {
        let mut state = binding.state.lock();
        if state.seq != seq || !redraw.is_current() {
            return;
        }

        let on_update = {
            let redraw = redraw.clone();
            Arc::new(move || {
                redraw.request();
            })
        };
        let subscription = handle.on_update(on_update);
        let previous = state.loaded.replace(Loaded {
            table: handle,
            subscription,
        });
        if let Some(previous) = previous {
            previous.table.remove_update(previous.subscription);
        }
    }

    tracing::debug!(widget = redraw.widget(), table = %table, "bound");
    redraw.request();
}

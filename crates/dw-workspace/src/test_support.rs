//! Recording doubles for the engine, viewers and host

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;

use dw_core::{DataView, SubscriptionId, Table, TableRef, UpdateCallback, WidgetConfig, WorkspaceConfig, WorkspaceSettings};
use dw_views::{LayoutHost, LayoutOp, PluginDescriptor, PluginRegistry, Viewer, ViewerContext, ViewerEvent};

use crate::{WidgetState, Workspace};

/// Plugin whose draw schedules another draw
pub const RECURSIVE_PLUGIN: &str = "Sunburst";

/// Plugin whose draw always fails
pub const BROKEN_PLUGIN: &str = "Broken";

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine table that refuses deletion while a view is being created
pub struct MockTable {
    schema: SchemaRef,
    in_flight: AtomicUsize,
    deleted: AtomicBool,
    next_subscription: AtomicU64,
    callbacks: Mutex<Vec<(SubscriptionId, UpdateCallback)>>,
}

impl MockTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            schema: Arc::new(Schema::new(vec![
                Field::new("State", DataType::Utf8, true),
                Field::new("Sales", DataType::Float64, true),
            ])),
            in_flight: AtomicUsize::new(0),
            deleted: AtomicBool::new(false),
            next_subscription: AtomicU64::new(1),
            callbacks: Mutex::new(Vec::new()),
        })
    }

    pub fn handle(self: &Arc<Self>) -> TableRef {
        self.clone()
    }

    /// Fire update callbacks as if rows were appended
    pub fn emit_update(&self) {
        let callbacks: Vec<UpdateCallback> = self.callbacks.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn subscribers(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Table for MockTable {
    async fn schema(&self) -> anyhow::Result<SchemaRef> {
        Ok(self.schema.clone())
    }

    async fn size(&self) -> anyhow::Result<usize> {
        Ok(0)
    }

    async fn view(&self, _config: &WidgetConfig) -> anyhow::Result<Arc<dyn DataView>> {
        anyhow::ensure!(!self.is_deleted(), "table was deleted");
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Arc::new(MockView {
            schema: self.schema.clone(),
        }))
    }

    async fn update(&self, _batch: RecordBatch) -> anyhow::Result<()> {
        self.emit_update();
        Ok(())
    }

    async fn delete(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.in_flight.load(Ordering::SeqCst) == 0, "table is in use");
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_update(&self, callback: UpdateCallback) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.callbacks.lock().push((id, callback));
        id
    }

    fn remove_update(&self, id: SubscriptionId) {
        self.callbacks.lock().retain(|(existing, _)| *existing != id);
    }
}

pub struct MockView {
    schema: SchemaRef,
}

#[async_trait::async_trait]
impl DataView for MockView {
    async fn num_rows(&self) -> anyhow::Result<usize> {
        Ok(0)
    }

    async fn to_batch(&self) -> anyhow::Result<RecordBatch> {
        Ok(RecordBatch::new_empty(self.schema.clone()))
    }

    async fn delete(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Per-widget counters shared by every mock viewer of a workspace
#[derive(Default)]
pub struct CallLog {
    created: Mutex<AHashMap<String, usize>>,
    draws: Mutex<AHashMap<String, usize>>,
    restores: Mutex<AHashMap<String, usize>>,
    loads: Mutex<AHashMap<String, usize>>,
    deletes: Mutex<AHashMap<String, usize>>,
    contexts: Mutex<AHashMap<String, ViewerContext>>,
}

impl CallLog {
    fn bump(counter: &Mutex<AHashMap<String, usize>>, widget: &str) {
        *counter.lock().entry(widget.to_string()).or_default() += 1;
    }

    fn read(counter: &Mutex<AHashMap<String, usize>>, widget: &str) -> usize {
        counter.lock().get(widget).copied().unwrap_or(0)
    }

    pub fn created(&self, widget: &str) -> usize {
        Self::read(&self.created, widget)
    }

    pub fn draws(&self, widget: &str) -> usize {
        Self::read(&self.draws, widget)
    }

    pub fn restores(&self, widget: &str) -> usize {
        Self::read(&self.restores, widget)
    }

    pub fn loads(&self, widget: &str) -> usize {
        Self::read(&self.loads, widget)
    }

    pub fn deletes(&self, widget: &str) -> usize {
        Self::read(&self.deletes, widget)
    }

    /// Dispatch an event from the newest instance of `widget`
    pub fn emit(&self, widget: &str, event: ViewerEvent) {
        let context = self.contexts.lock().get(widget).cloned();
        match context {
            Some(context) => context.events.emit(event),
            None => panic!("no viewer created for {}", widget),
        }
    }
}

/// Viewer that records every call into a [`CallLog`]
pub struct MockViewer {
    context: ViewerContext,
    calls: Arc<CallLog>,
    config: Mutex<WidgetConfig>,
    view: Mutex<Option<Arc<dyn DataView>>>,
    recursive: bool,
    broken: bool,
}

#[async_trait::async_trait]
impl Viewer for MockViewer {
    async fn load(&self, table: TableRef) -> anyhow::Result<()> {
        CallLog::bump(&self.calls.loads, &self.context.name);
        let config = self.config.lock().clone();
        let view = table.view(&config).await?;
        let previous = self.view.lock().replace(view);
        if let Some(previous) = previous {
            previous.delete().await?;
        }
        Ok(())
    }

    async fn restore(&self, config: &WidgetConfig) -> anyhow::Result<()> {
        CallLog::bump(&self.calls.restores, &self.context.name);
        *self.config.lock() = config.clone();
        Ok(())
    }

    async fn save(&self) -> anyhow::Result<WidgetConfig> {
        Ok(self.config.lock().clone())
    }

    async fn get_view(&self) -> Option<Arc<dyn DataView>> {
        self.view.lock().clone()
    }

    async fn draw(&self) -> anyhow::Result<()> {
        CallLog::bump(&self.calls.draws, &self.context.name);
        tokio::task::yield_now().await;
        if self.recursive {
            self.context.redraw.request();
        }
        anyhow::ensure!(!self.broken, "render failed");
        Ok(())
    }

    async fn delete(&self) -> anyhow::Result<()> {
        CallLog::bump(&self.calls.deletes, &self.context.name);
        let view = self.view.lock().take();
        if let Some(view) = view {
            view.delete().await?;
        }
        Ok(())
    }
}

fn mock_plugin(name: &str, priority: i32, calls: &Arc<CallLog>) -> PluginDescriptor {
    let calls = calls.clone();
    let plugin = name.to_string();
    PluginDescriptor::new(name, priority, move |context: ViewerContext| {
        CallLog::bump(&calls.created, &context.name);
        calls.contexts.lock().insert(context.name.clone(), context.clone());
        Arc::new(MockViewer {
            context,
            calls: calls.clone(),
            config: Mutex::new(WidgetConfig::default()),
            view: Mutex::new(None),
            recursive: plugin == RECURSIVE_PLUGIN,
            broken: plugin == BROKEN_PLUGIN,
        }) as Arc<dyn Viewer>
    })
}

/// "Datagrid" (the default), plus the recursive and broken plugins
pub fn mock_plugins(calls: &Arc<CallLog>) -> PluginRegistry {
    PluginRegistry::new()
        .with(mock_plugin("Datagrid", 10, calls))
        .with(mock_plugin(RECURSIVE_PLUGIN, 0, calls))
        .with(mock_plugin(BROKEN_PLUGIN, 0, calls))
}

/// Host that keeps every operation it was sent
#[derive(Default)]
pub struct RecordingHost {
    pub ops: Mutex<Vec<LayoutOp>>,
    pub resizes: AtomicUsize,
}

impl RecordingHost {
    pub fn take(&self) -> Vec<LayoutOp> {
        std::mem::take(&mut *self.ops.lock())
    }
}

#[async_trait::async_trait]
impl LayoutHost for RecordingHost {
    async fn apply(&self, ops: &[LayoutOp]) -> anyhow::Result<()> {
        self.ops.lock().extend_from_slice(ops);
        Ok(())
    }

    async fn resize(&self) -> anyhow::Result<()> {
        self.resizes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A workspace over mock plugins with a "superstore" table registered
pub struct Fixture {
    pub workspace: Workspace,
    pub calls: Arc<CallLog>,
    pub table: Arc<MockTable>,
    pub host: Arc<RecordingHost>,
}

impl Fixture {
    pub fn new() -> Self {
        init_test_logging();
        let calls = Arc::new(CallLog::default());
        let host = Arc::new(RecordingHost::default());
        let workspace = Workspace::with_host(mock_plugins(&calls), WorkspaceSettings::default(), host.clone());
        let table = MockTable::new();
        workspace.tables().set("superstore", table.handle());

        Self {
            workspace,
            calls,
            table,
            host,
        }
    }

    pub async fn state(&self, widget: &str) -> Option<WidgetState> {
        self.workspace.widget_state(widget).await.unwrap()
    }

    pub async fn restored(&self, config: &WorkspaceConfig) {
        self.workspace.restore(config.clone()).await.unwrap();
        self.workspace.flush().await.unwrap();
    }
}

pub fn workspace_config(value: serde_json::Value) -> WorkspaceConfig {
    serde_json::from_value(value).unwrap()
}

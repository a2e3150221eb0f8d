//! Workspace facade - the object applications talk to
//!
//! Every call is turned into a [`Command`] and queued to a single actor
//! task that owns the reconciler, so operations on one workspace apply
//! strictly in call order. Methods enqueue eagerly: the command is queued
//! when the method is called, not when the returned future is first
//! polled.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use dw_core::events::events::{LayoutUpdateReason, LayoutUpdated};
use dw_core::{DetailArea, EventBus, LinkMode, MasterArea, Result, TableRef, WorkspaceConfig, WorkspaceError, WorkspaceSettings};
use dw_data::{TableRegistry, TableSubscriber};
use dw_views::{LayoutHost, NullHost, PluginRegistry, ViewerMessage};

use crate::linked;
use crate::reconciler::{Reconciler, WidgetState};

/// Messages processed by the workspace actor
enum Command {
    Restore {
        config: WorkspaceConfig,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Save {
        respond_to: oneshot::Sender<WorkspaceConfig>,
    },
    Flush {
        respond_to: oneshot::Sender<()>,
    },
    Resize {
        respond_to: oneshot::Sender<()>,
    },
    SettleTable {
        name: String,
        respond_to: oneshot::Sender<()>,
    },
    TableSet {
        name: String,
    },
    SetAttached {
        attached: bool,
        respond_to: oneshot::Sender<()>,
    },
    WidgetState {
        name: String,
        respond_to: oneshot::Sender<Option<WidgetState>>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Restore { .. } => "restore",
            Command::Save { .. } => "save",
            Command::Flush { .. } => "flush",
            Command::Resize { .. } => "resize",
            Command::SettleTable { .. } => "settle-table",
            Command::TableSet { .. } => "table-set",
            Command::SetAttached { .. } => "set-attached",
            Command::WidgetState { .. } => "widget-state",
            Command::Close { .. } => "close",
        }
    }
}

/// Forwards registry changes into the command queue
struct TableWatch {
    commands: mpsc::UnboundedSender<Command>,
}

impl TableSubscriber for TableWatch {
    fn on_table_set(&self, name: &str) {
        let _ = self.commands.send(Command::TableSet { name: name.to_string() });
    }
}

/// A dashboard workspace: a layout of viewers bound to named tables.
///
/// Must be created inside a tokio runtime.
pub struct Workspace {
    commands: mpsc::UnboundedSender<Command>,
    tables: TableRegistry,
    events: Arc<EventBus>,
    _watch: Arc<TableWatch>,
}

impl Workspace {
    /// Create a headless workspace
    pub fn new(plugins: PluginRegistry, settings: WorkspaceSettings) -> Self {
        Self::with_host(plugins, settings, Arc::new(NullHost))
    }

    /// Create a workspace rendering into `host`
    pub fn with_host(plugins: PluginRegistry, settings: WorkspaceSettings, host: Arc<dyn LayoutHost>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (viewer_events, viewer_receiver) = mpsc::unbounded_channel();
        let tables = TableRegistry::new();
        let events = Arc::new(EventBus::new());

        let actor = WorkspaceActor {
            reconciler: Reconciler::new(plugins, settings, tables.clone(), host, viewer_events),
            events: events.clone(),
            mode: None,
            sizes: None,
            master: None,
            receiver,
            viewer_events: viewer_receiver,
        };
        tokio::spawn(actor.run());

        let watch = Arc::new(TableWatch {
            commands: commands.clone(),
        });
        tables.add_subscriber(watch.clone());

        Self {
            commands,
            tables,
            events,
            _watch: watch,
        }
    }

    /// The table registry; `set` and `delete` take effect immediately and
    /// rebinding is queued behind earlier calls
    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    /// Bus carrying `LayoutUpdated` and the forwarded viewer events
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Apply a workspace config
    pub fn restore(&self, config: WorkspaceConfig) -> impl Future<Output = Result<()>> + Send + 'static {
        let reply = self.call(move |respond_to| Command::Restore { config, respond_to });
        async move { reply.await? }
    }

    /// Migrate a legacy config, then apply it
    pub fn restore_json(&self, config: &Value) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = dw_migrate::convert_workspace(config)
            .map_err(|e| WorkspaceError::Config(e.to_string()))
            .map(|config| self.restore(config));
        async move { pending?.await }
    }

    /// Serialize the current layout and every viewer's config
    pub fn save(&self) -> impl Future<Output = Result<WorkspaceConfig>> + Send + 'static {
        self.call(|respond_to| Command::Save { respond_to })
    }

    /// Resolves once queued calls, bind tasks, disposals and draws settled
    pub fn flush(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.call(|respond_to| Command::Flush { respond_to })
    }

    /// The host element was resized
    pub fn notify_resize(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.call(|respond_to| Command::Resize { respond_to })
    }

    /// Resolve a table once every pending bind against it has settled, so
    /// the caller may delete it right after
    pub fn get_table(&self, name: &str) -> impl Future<Output = Result<TableRef>> + Send + 'static {
        let name = name.to_string();
        let settled = self.call({
            let name = name.clone();
            move |respond_to| Command::SettleTable { name, respond_to }
        });
        let tables = self.tables.clone();
        async move {
            settled.await?;
            tables.resolve(&name).await
        }
    }

    /// Host attach (`true`) or detach (`false`)
    pub fn set_attached(&self, attached: bool) -> impl Future<Output = Result<()>> + Send + 'static {
        self.call(move |respond_to| Command::SetAttached { attached, respond_to })
    }

    /// Snapshot of one live widget
    pub fn widget_state(&self, name: &str) -> impl Future<Output = Result<Option<WidgetState>>> + Send + 'static {
        let name = name.to_string();
        self.call(move |respond_to| Command::WidgetState { name, respond_to })
    }

    /// Tear down every widget and stop the actor; later calls fail with
    /// [`WorkspaceError::Closed`]
    pub fn close(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.call(|respond_to| Command::Close { respond_to })
    }

    fn call<T: Send + 'static>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command + 'static,
    ) -> impl Future<Output = Result<T>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.commands.send(command(tx)).is_ok();
        async move {
            if !sent {
                return Err(WorkspaceError::Closed);
            }
            rx.await.map_err(|_| WorkspaceError::Closed)
        }
    }
}

/// Owns the reconciler and the state that is not derivable from the live
/// tree
struct WorkspaceActor {
    reconciler: Reconciler,
    events: Arc<EventBus>,
    mode: Option<LinkMode>,
    sizes: Option<Vec<f64>>,
    master: Option<MasterArea>,
    receiver: mpsc::UnboundedReceiver<Command>,
    viewer_events: mpsc::UnboundedReceiver<ViewerMessage>,
}

impl WorkspaceActor {
    async fn run(mut self) {
        tracing::debug!("workspace actor started");
        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => {
                        if !self.handle(command).await {
                            break;
                        }
                    }
                    None => {
                        self.reconciler.clear().await;
                        self.reconciler.flush().await;
                        break;
                    }
                },
                Some(message) = self.viewer_events.recv() => self.on_viewer_event(message).await,
            }
        }
        tracing::debug!("workspace actor stopped");
    }

    fn link_mode(&self) -> LinkMode {
        self.mode.unwrap_or(self.reconciler.settings().default_mode)
    }

    async fn on_viewer_event(&mut self, message: ViewerMessage) {
        let mode = self.link_mode();
        linked::handle_viewer_event(&mut self.reconciler, &self.events, mode, message).await;
    }

    /// Returns `false` once the actor should stop
    async fn handle(&mut self, command: Command) -> bool {
        tracing::trace!(command = command.name(), "handling command");
        match command {
            Command::Restore { config, respond_to } => {
                let result = self.restore(config).await;
                let _ = respond_to.send(result);
            }
            Command::Save { respond_to } => {
                let _ = respond_to.send(self.save().await);
            }
            Command::Flush { respond_to } => {
                while let Ok(message) = self.viewer_events.try_recv() {
                    self.on_viewer_event(message).await;
                }
                self.reconciler.flush().await;
                let _ = respond_to.send(());
            }
            Command::Resize { respond_to } => {
                self.reconciler.resize().await;
                let _ = respond_to.send(());
            }
            Command::SettleTable { name, respond_to } => {
                self.reconciler.settle_table(&name).await;
                let _ = respond_to.send(());
            }
            Command::TableSet { name } => self.reconciler.on_table_set(&name),
            Command::SetAttached { attached, respond_to } => {
                self.reconciler.set_attached(attached);
                let _ = respond_to.send(());
            }
            Command::WidgetState { name, respond_to } => {
                let _ = respond_to.send(self.reconciler.widget_state(&name));
            }
            Command::Close { respond_to } => {
                self.reconciler.clear().await;
                self.reconciler.flush().await;
                self.receiver.close();
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    async fn restore(&mut self, config: WorkspaceConfig) -> Result<()> {
        let structural = self.reconciler.restore(&config).await?;
        self.mode = config.mode;
        self.sizes = config.sizes;
        self.master = config.master;
        if structural {
            self.events.publish(LayoutUpdated {
                reason: LayoutUpdateReason::Restore,
            });
        }
        Ok(())
    }

    async fn save(&self) -> WorkspaceConfig {
        WorkspaceConfig {
            sizes: self.sizes.clone(),
            master: self.master.clone(),
            detail: DetailArea {
                main: self.reconciler.detail_area(),
            },
            viewers: self.reconciler.save_viewers().await,
            mode: self.mode,
        }
    }
}

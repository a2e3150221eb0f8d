//! Visibility-gated draw scheduling
//!
//! Each widget has a slot holding its visibility state and a generation
//! number. Draw requests carry the generation they were made under and are
//! executed one at a time by a single executor task. When a request is
//! dequeued it is dropped if its generation is no longer current or the
//! widget is not visible, so a viewer that reschedules itself from inside
//! `draw()` stops the moment it is unmounted.

use std::sync::{Arc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::viewer::Viewer;

/// Per-widget counter, bumped on every mount and unmount
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Unmounted,
    Hidden,
    Visible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Draw,
    Resize,
}

#[derive(Debug)]
struct DrawRequest {
    widget: String,
    generation: Generation,
    kind: DrawKind,
}

enum SchedulerMessage {
    Draw(DrawRequest),
    Barrier(oneshot::Sender<()>),
}

struct Slot {
    generation: Generation,
    state: Visibility,
    viewer: Option<Arc<dyn Viewer>>,
    pending_draw: bool,
    pending_resize: bool,
    stale: bool,
    /// Held by the executor for the duration of a draw
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl Slot {
    fn pending(&mut self, kind: DrawKind) -> &mut bool {
        match kind {
            DrawKind::Draw => &mut self.pending_draw,
            DrawKind::Resize => &mut self.pending_resize,
        }
    }
}

struct Inner {
    slots: Mutex<AHashMap<String, Slot>>,
    queue: mpsc::UnboundedSender<SchedulerMessage>,
}

impl Inner {
    fn request(&self, widget: &str, generation: Generation, kind: DrawKind) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(widget) else {
            return false;
        };
        if slot.generation != generation || slot.state != Visibility::Visible {
            tracing::trace!(widget, generation, state = ?slot.state, "draw request dropped");
            return false;
        }

        let pending = slot.pending(kind);
        if *pending {
            return true;
        }
        *pending = true;

        let request = DrawRequest {
            widget: widget.to_string(),
            generation,
            kind,
        };
        self.queue.send(SchedulerMessage::Draw(request)).is_ok()
    }

    fn is_current(&self, widget: &str, generation: Generation) -> bool {
        self.slots
            .lock()
            .get(widget)
            .map_or(false, |slot| slot.generation == generation && slot.state != Visibility::Unmounted)
    }
}

/// Draw executor for one workspace.
///
/// Must be created inside a tokio runtime. The executor task stops when the
/// scheduler is dropped.
pub struct VisibilityScheduler {
    inner: Arc<Inner>,
}

impl VisibilityScheduler {
    pub fn new() -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            slots: Mutex::new(AHashMap::new()),
            queue,
        });
        tokio::spawn(run_executor(Arc::downgrade(&inner), receiver));
        Self { inner }
    }

    /// Start a new generation for `widget` in the Hidden state
    pub fn mount(&self, widget: &str) -> Redraw {
        let mut slots = self.inner.slots.lock();
        let generation = slots.get(widget).map_or(1, |slot| slot.generation + 1);
        slots.insert(
            widget.to_string(),
            Slot {
                generation,
                state: Visibility::Hidden,
                viewer: None,
                pending_draw: false,
                pending_resize: false,
                stale: false,
                in_flight: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        tracing::debug!(widget, generation, "mounted");

        Redraw {
            widget: Arc::from(widget),
            generation,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Attach the viewer built for a mount; ignored if that mount is gone
    pub fn install(&self, redraw: &Redraw, viewer: Arc<dyn Viewer>) -> bool {
        let mut slots = self.inner.slots.lock();
        match slots.get_mut(redraw.widget()) {
            Some(slot) if slot.generation == redraw.generation && slot.state != Visibility::Unmounted => {
                slot.viewer = Some(viewer);
                true
            }
            _ => false,
        }
    }

    /// Move a mounted widget between Hidden and Visible.
    ///
    /// Becoming visible enqueues a draw. Returns whether the state changed.
    pub fn set_visible(&self, widget: &str, visible: bool) -> bool {
        let target = if visible { Visibility::Visible } else { Visibility::Hidden };
        let generation = {
            let mut slots = self.inner.slots.lock();
            match slots.get_mut(widget) {
                Some(slot) if slot.state != Visibility::Unmounted && slot.state != target => {
                    slot.state = target;
                    slot.generation
                }
                _ => return false,
            }
        };

        tracing::trace!(widget, visible, "visibility changed");
        if visible {
            self.inner.request(widget, generation, DrawKind::Draw);
        }
        true
    }

    /// Request a draw of the current generation
    pub fn request(&self, widget: &str, kind: DrawKind) -> bool {
        match self.generation(widget) {
            Some(generation) => self.inner.request(widget, generation, kind),
            None => false,
        }
    }

    /// Request `kind` for every visible widget
    pub fn request_visible(&self, kind: DrawKind) {
        let visible: Vec<(String, Generation)> = self
            .inner
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state == Visibility::Visible)
            .map(|(name, slot)| (name.clone(), slot.generation))
            .collect();

        for (widget, generation) in visible {
            self.inner.request(&widget, generation, kind);
        }
    }

    /// Invalidate the widget's generation and release its viewer.
    ///
    /// Returns `None` if the widget was not mounted.
    pub fn unmount(&self, widget: &str) -> Option<Teardown> {
        let mut slots = self.inner.slots.lock();
        let slot = slots.get_mut(widget)?;
        if slot.state == Visibility::Unmounted {
            return None;
        }

        slot.generation += 1;
        slot.state = Visibility::Unmounted;
        slot.pending_draw = false;
        slot.pending_resize = false;
        tracing::debug!(widget, generation = slot.generation, "unmounted");

        Some(Teardown {
            widget: widget.to_string(),
            viewer: slot.viewer.take(),
            in_flight: slot.in_flight.clone(),
        })
    }

    /// Resolves once every request enqueued before this call was handled
    pub async fn barrier(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.queue.send(SchedulerMessage::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn visibility(&self, widget: &str) -> Visibility {
        self.inner
            .slots
            .lock()
            .get(widget)
            .map_or(Visibility::Unmounted, |slot| slot.state)
    }

    /// Generation of a mounted widget
    pub fn generation(&self, widget: &str) -> Option<Generation> {
        self.inner
            .slots
            .lock()
            .get(widget)
            .filter(|slot| slot.state != Visibility::Unmounted)
            .map(|slot| slot.generation)
    }

    /// Whether the widget's last draw failed
    pub fn is_stale(&self, widget: &str) -> bool {
        self.inner.slots.lock().get(widget).map_or(false, |slot| slot.stale)
    }
}

impl Default for VisibilityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Redraw capability handed to a viewer, bound to the generation it was
/// mounted under
#[derive(Clone)]
pub struct Redraw {
    widget: Arc<str>,
    generation: Generation,
    inner: Weak<Inner>,
}

impl Redraw {
    /// Ask for a draw; a no-op once the widget was unmounted or hidden
    pub fn request(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.request(&self.widget, self.generation, DrawKind::Draw),
            None => false,
        }
    }

    /// Whether the mount this handle belongs to is still live
    pub fn is_current(&self) -> bool {
        self.inner
            .upgrade()
            .map_or(false, |inner| inner.is_current(&self.widget, self.generation))
    }

    pub fn widget(&self) -> &str {
        &self.widget
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl std::fmt::Debug for Redraw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redraw")
            .field("widget", &self.widget)
            .field("generation", &self.generation)
            .finish()
    }
}

/// What is left of a widget after `unmount`
pub struct Teardown {
    widget: String,
    viewer: Option<Arc<dyn Viewer>>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl Teardown {
    pub fn widget(&self) -> &str {
        &self.widget
    }

    /// Resolves once a draw dispatched before the unmount has finished
    pub async fn settled(&self) {
        let _guard = self.in_flight.lock().await;
    }

    /// Wait for in-flight draws, then flush and delete the viewer
    pub async fn dispose(self, timeout: Duration) {
        self.settled().await;
        let Some(viewer) = self.viewer else {
            return;
        };

        let result = tokio::time::timeout(timeout, flush_and_delete(viewer.as_ref())).await;

        match result {
            Ok(Ok(())) => tracing::debug!(widget = %self.widget, "viewer disposed"),
            Ok(Err(e)) => tracing::warn!(widget = %self.widget, "viewer delete failed: {:#}", e),
            Err(_) => tracing::warn!(widget = %self.widget, ?timeout, "viewer delete timed out"),
        }
    }
}

async fn flush_and_delete(viewer: &dyn Viewer) -> anyhow::Result<()> {
    viewer.flush().await?;
    viewer.delete().await
}

async fn run_executor(inner: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<SchedulerMessage>) {
    while let Some(message) = receiver.recv().await {
        match message {
            SchedulerMessage::Barrier(done) => {
                let _ = done.send(());
            }
            SchedulerMessage::Draw(request) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                dispatch(&inner, request).await;
            }
        }
    }
    tracing::trace!("draw executor stopped");
}

async fn dispatch(inner: &Inner, request: DrawRequest) {
    let (viewer, in_flight) = {
        let mut slots = inner.slots.lock();
        let Some(slot) = slots.get_mut(&request.widget) else {
            return;
        };
        if slot.generation != request.generation {
            tracing::trace!(widget = %request.widget, generation = request.generation, "stale draw dropped");
            return;
        }
        *slot.pending(request.kind) = false;
        if slot.state != Visibility::Visible {
            tracing::trace!(widget = %request.widget, state = ?slot.state, "draw for hidden widget dropped");
            return;
        }
        match &slot.viewer {
            Some(viewer) => (viewer.clone(), slot.in_flight.clone()),
            None => return,
        }
    };

    let _guard = in_flight.lock().await;
    if !inner.is_current(&request.widget, request.generation) {
        return;
    }

    let result = match request.kind {
        DrawKind::Draw => viewer.draw().await,
        DrawKind::Resize => viewer.resize().await,
    };

    let failed = result.is_err();
    if let Err(e) = result {
        tracing::warn!(widget = %request.widget, kind = ?request.kind, "draw failed: {:#}", e);
    }
    if let Some(slot) = inner.slots.lock().get_mut(&request.widget) {
        if slot.generation == request.generation {
            slot.stale = failed;
        }
    }
}

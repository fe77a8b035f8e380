// EventLoopBridge - Carries work from the camera side onto the Slint event loop
//
// The scanner runs three kinds of threads:
// 1. Slint's single-threaded GUI event loop (owns the window and the result callback)
// 2. Tokio tasks pumping camera events
// 3. The camera worker thread producing frames
//
// Everything that touches the window or delivers a result goes through this bridge.

use crate::metrics::ScanMetrics;
use slint::ComponentHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of the UI update queue
pub const UI_UPDATE_BUFFER: usize = 100;

type UiUpdate<T> = Box<dyn FnOnce(&T) + Send>;

/// Coordinates between the tokio runtime and the Slint event loop
///
/// Three ways to queue work for the UI thread:
/// - [`update_ui()`](EventLoopBridgeHandle::update_ui): fire-and-forget, dropped when the
///   queue is full (preview frames only)
/// - [`update_ui_ordered()`](EventLoopBridgeHandle::update_ui_ordered): waits for queue
///   space, so decode batches and failures reach the session in camera order
/// - [`update_ui_blocking()`](EventLoopBridgeHandle::update_ui_blocking): same guarantee
///   for plain threads (session state changes)
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let ui = ScannerWindow::new()?;
/// let bridge = EventLoopBridge::new(&ui, runtime.handle().clone(), metrics);
///
/// let handle = bridge.clone_handle();
/// bridge.spawn_async(move || async move {
///     handle.update_ui(|ui| ui.set_camera_ready(true));
/// });
/// ```
pub struct EventLoopBridge<T: ComponentHandle> {
    handle: EventLoopBridgeHandle<T>,
}

impl<T: ComponentHandle + 'static> EventLoopBridge<T> {
    /// Create a new EventLoopBridge
    ///
    /// This sets up a background handler thread that drains the update queue
    /// and marshals each update to the Slint event loop with `upgrade_in_event_loop`.
    pub fn new(ui: &T, tokio_handle: tokio::runtime::Handle, metrics: Arc<ScanMetrics>) -> Self {
        let ui_weak = ui.as_weak();
        let (updates, mut ui_update_rx) = ui_update_channel::<T>(UI_UPDATE_BUFFER);

        let handler_metrics = Arc::clone(&metrics);
        let spawned = std::thread::Builder::new()
            .name("kscan-ui-bridge".to_string())
            .spawn(move || {
                tracing::debug!("EventLoopBridge handler thread started");

                while let Some(update_fn) = ui_update_rx.blocking_recv() {
                    let result = ui_weak.upgrade_in_event_loop(move |ui| {
                        update_fn(&ui);
                    });

                    if let Err(e) = result {
                        // The event loop has stopped; nothing more can be shown
                        tracing::warn!("Failed to queue UI update to event loop: {:?}", e);
                        break;
                    }
                    handler_metrics.record_ui_update();
                }

                tracing::debug!("EventLoopBridge handler thread terminated");
            });

        if let Err(e) = spawned {
            // Dropping the receiver closes the queue; senders see Closed and log
            tracing::error!("Failed to spawn UI bridge thread: {}", e);
        }

        Self {
            handle: EventLoopBridgeHandle {
                tokio_handle,
                updates,
            },
        }
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn_async(future_factory);
    }

    /// Clone a lightweight handle for callbacks, tasks and threads
    pub fn clone_handle(&self) -> EventLoopBridgeHandle<T> {
        self.handle.clone()
    }
}

/// Sending side of the UI update queue.
///
/// Independent of Slint so the queueing policy can be used (and tested) with
/// any target type.
pub struct UiUpdateSender<T> {
    tx: mpsc::Sender<UiUpdate<T>>,
}

impl<T> Clone for UiUpdateSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Bounded queue of updates for a `T`
pub fn ui_update_channel<T>(capacity: usize) -> (UiUpdateSender<T>, mpsc::Receiver<UiUpdate<T>>) {
    let (tx, rx) = mpsc::channel(capacity);
    (UiUpdateSender { tx }, rx)
}

impl<T> UiUpdateSender<T> {
    /// Queue without waiting; `false` if the update was dropped
    pub fn try_send<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.tx.try_send(Box::new(update)) {
            Ok(_) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("UI update channel full - skipping update");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Failed to send UI update - handler thread has stopped");
                false
            }
        }
    }

    /// Queue, waiting for space; `false` once the receiver is gone
    pub async fn send<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.tx.send(Box::new(update)).await {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("UI update queue closed");
                false
            }
        }
    }

    /// Queue from a plain thread, blocking for space; `false` once the receiver is gone
    pub fn blocking_send<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        match self.tx.blocking_send(Box::new(update)) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("UI update queue closed");
                false
            }
        }
    }
}

/// Lightweight handle that can be cloned and passed to callbacks
pub struct EventLoopBridgeHandle<T: ComponentHandle> {
    tokio_handle: tokio::runtime::Handle,
    updates: UiUpdateSender<T>,
}

// Manual Clone implementation to avoid requiring T: Clone
impl<T: ComponentHandle> Clone for EventLoopBridgeHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tokio_handle: self.tokio_handle.clone(),
            updates: self.updates.clone(),
        }
    }
}

impl<T: ComponentHandle + 'static> EventLoopBridgeHandle<T> {
    /// Schedule a UI update from any thread
    ///
    /// Never blocks. Returns `false` if the update was dropped because the queue
    /// is full or the handler thread has stopped.
    pub fn update_ui<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.updates.try_send(update)
    }

    /// Schedule a UI update, waiting for queue space
    ///
    /// Updates queued this way run in the order they were queued.
    ///
    /// # Returns
    /// `false` once the UI is gone; callers should stop producing updates
    pub async fn update_ui_ordered<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.updates.send(update).await
    }

    /// Schedule a UI update from a plain thread, blocking until there is queue space
    ///
    /// Must not be called from inside the tokio runtime or on the UI thread.
    ///
    /// # Returns
    /// `false` once the UI is gone
    pub fn update_ui_blocking<F>(&self, update: F) -> bool
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.updates.blocking_send(update)
    }

    /// Spawn an async task on the tokio runtime
    pub fn spawn_async<F, Fut>(&self, future_factory: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tokio_handle.spawn(async move {
            future_factory().await;
        });
    }
}

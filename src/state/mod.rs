// Session state module
//
// SessionManager wraps ScanState with thread-safe access, applies the scan
// aggregation policy, delivers results to the caller's callback and emits
// change events for the UI.

use crate::metrics::ScanMetrics;
use crate::models::{Barcode, BarcodeFormat, BarcodeResult, ResultKind, ScanError, ScanState, SessionPhase};
use crate::services::aggregator::{BatchOutcome, ScanAggregator};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;

/// Caller-supplied result sink. Runs on the thread that triggered the decision
/// (the UI thread in the scanner window).
pub type ResultCallback = Box<dyn FnMut(BarcodeResult) + Send>;

/// The caller's callback plus results queued while it is running.
///
/// The callback is taken out for the duration of a call, so a callback that
/// re-enters the session (cancel from inside a Success, say) queues its
/// result instead of blocking on the sink.
struct ResultSink {
    callback: Option<ResultCallback>,
    queued: VecDeque<BarcodeResult>,
}

/// Change events emitted when session state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    /// Camera was bound or released
    CameraBindingChanged { bound: bool },

    /// Torch state reported by the camera changed
    TorchChanged { enabled: bool },

    /// Zoom ratio or its upper bound changed
    ZoomChanged { ratio: f32, max_ratio: f32 },

    /// Several barcodes are waiting for a pick
    SheetOpened { barcodes: Vec<Barcode> },

    /// Sheet closed (picked or dismissed)
    SheetClosed,

    /// A result was handed to the caller
    ResultDelivered { kind: ResultKind },

    /// Cancel or failure ended the session
    SessionEnded,
}

/// Thread-safe scanning session with event emission
///
/// This is the only place that mutates [`ScanState`]:
/// - [`on_frame_batch`](Self::on_frame_batch), [`select_barcode`](Self::select_barcode),
///   [`dismiss_sheet`](Self::dismiss_sheet), [`cancel`](Self::cancel) and
///   [`fail`](Self::fail) drive the aggregation policy and deliver results
/// - the `on_camera_*` / `on_torch_*` / `on_zoom_*` methods cache what the camera reports
/// - [`subscribe()`](Self::subscribe) gives a [`SessionChange`] stream for UI sync
///
/// The result callback is always invoked with no lock held, so it may read
/// the session or call back into it. Results produced from inside the
/// callback are delivered after it returns, in order.
pub struct SessionManager {
    state: Arc<RwLock<ScanState>>,
    change_tx: broadcast::Sender<SessionChange>,
    on_result: Arc<Mutex<ResultSink>>,
    metrics: Arc<ScanMetrics>,
}

impl SessionManager {
    /// Create a session accepting `formats`
    ///
    /// # Returns
    /// A new SessionManager with a broadcast channel buffer of 100 events
    pub fn new<F>(formats: Vec<BarcodeFormat>, on_result: F, metrics: Arc<ScanMetrics>) -> Self
    where
        F: FnMut(BarcodeResult) + Send + 'static,
    {
        if formats.is_empty() {
            tracing::warn!("No barcode formats requested; accepting every format");
        }

        let (change_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(ScanState::for_formats(formats))),
            change_tx,
            on_result: Arc::new(Mutex::new(ResultSink {
                callback: Some(Box::new(on_result)),
                queued: VecDeque::new(),
            })),
            metrics,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> ScanState {
        self.read(|state| state.clone())
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&ScanState) -> R,
    {
        // A poisoned lock only means a callback panicked mid-read; the state is still usable
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// The closure's return value and the SessionChange events that were emitted
    pub fn update<F, R>(&self, update_fn: F) -> (R, Vec<SessionChange>)
    where
        F: FnOnce(&mut ScanState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let old_state = state.clone();

        let output = update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.change_tx.send(change.clone());
        }

        (output, changes)
    }

    /// Subscribe to session change events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.change_tx.subscribe()
    }

    pub fn metrics(&self) -> &Arc<ScanMetrics> {
        &self.metrics
    }

    /// Detect what changed between two states and generate events
    fn detect_changes(old: &ScanState, new: &ScanState) -> Vec<SessionChange> {
        let mut changes = Vec::new();

        if old.camera_bound != new.camera_bound {
            changes.push(SessionChange::CameraBindingChanged {
                bound: new.camera_bound,
            });
        }

        if old.torch_enabled != new.torch_enabled {
            changes.push(SessionChange::TorchChanged {
                enabled: new.torch_enabled,
            });
        }

        if old.zoom_ratio != new.zoom_ratio || old.max_zoom_ratio != new.max_zoom_ratio {
            changes.push(SessionChange::ZoomChanged {
                ratio: new.zoom_ratio,
                max_ratio: new.max_zoom_ratio,
            });
        }

        if old.sheet_visible != new.sheet_visible {
            if new.sheet_visible {
                changes.push(SessionChange::SheetOpened {
                    barcodes: new.pending_barcodes(),
                });
            } else {
                changes.push(SessionChange::SheetClosed);
            }
        }

        if new.results_delivered != old.results_delivered {
            if let Some(kind) = new.last_result {
                changes.push(SessionChange::ResultDelivered { kind });
            }
        }

        if old.phase != new.phase && new.phase == SessionPhase::Ended {
            changes.push(SessionChange::SessionEnded);
        }

        changes
    }

    /// Record `result` in the state (inside an update) and return it for delivery
    fn record_result(state: &mut ScanState, result: BarcodeResult) -> BarcodeResult {
        state.results_delivered += 1;
        state.last_result = Some(result.kind());
        if result.ends_session() {
            state.close_sheet();
            state.phase = SessionPhase::Ended;
        }
        result
    }

    fn lock_sink(&self) -> MutexGuard<'_, ResultSink> {
        self.on_result.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand a result to the caller. Must be called without holding the state lock.
    ///
    /// Whoever holds the callback drains the queue; a delivery that finds the
    /// callback already taken only enqueues.
    fn deliver(&self, result: BarcodeResult) {
        self.metrics.record_result(result.kind());
        tracing::info!("Delivering scan result: {:?}", result);

        let mut next = Some(result);
        loop {
            let (mut callback, result) = {
                let mut sink = self.lock_sink();
                if let Some(result) = next.take() {
                    sink.queued.push_back(result);
                }
                let Some(callback) = sink.callback.take() else {
                    return;
                };
                match sink.queued.pop_front() {
                    Some(result) => (callback, result),
                    None => {
                        sink.callback = Some(callback);
                        return;
                    }
                }
            };

            callback(result);
            self.lock_sink().callback = Some(callback);
        }
    }

    // Aggregation events

    /// Apply one analyzed frame batch
    ///
    /// # Returns
    /// What the aggregator decided; `Matched` means a Success was delivered
    pub fn on_frame_batch(&self, batch: Vec<Barcode>) -> BatchOutcome {
        let size = batch.len();
        let (outcome, _) = self.update(|state| {
            let outcome = ScanAggregator::on_batch(state, batch);
            if let BatchOutcome::Matched(barcode) = &outcome {
                Self::record_result(state, BarcodeResult::Success(barcode.clone()));
            }
            outcome
        });

        match &outcome {
            BatchOutcome::Ignored => {
                self.metrics.record_batch_ignored();
                tracing::trace!("Frame batch of {} ignored", size);
            }
            BatchOutcome::NoMatch => self.metrics.record_batch(0),
            BatchOutcome::Matched(barcode) => {
                self.metrics.record_batch(1);
                self.deliver(BarcodeResult::Success(barcode.clone()));
            }
            BatchOutcome::Ambiguous { pending } => {
                self.metrics.record_batch(size);
                tracing::info!("{} barcodes in frame, asking user to pick ({} pending)", size, pending);
            }
        }

        outcome
    }

    /// Resolve the selection sheet with the user's pick
    ///
    /// # Returns
    /// `true` if `barcode` was pending and a Success was delivered
    pub fn select_barcode(&self, barcode: &Barcode) -> bool {
        let (picked, _) = self.update(|state| {
            let picked = ScanAggregator::select(state, barcode);
            if let Some(picked) = &picked {
                Self::record_result(state, BarcodeResult::Success(picked.clone()));
            }
            picked
        });

        match picked {
            Some(picked) => {
                self.deliver(BarcodeResult::Success(picked));
                true
            }
            None => {
                tracing::warn!("Ignoring selection of {}: not pending", barcode);
                false
            }
        }
    }

    /// Pick the pending barcode at `index` (sheet order)
    pub fn select_pending_at(&self, index: usize) -> bool {
        let barcode = self.read(|state| state.pending.get_index(index).cloned());
        match barcode {
            Some(barcode) => self.select_barcode(&barcode),
            None => {
                tracing::warn!("Ignoring selection of pending index {}: out of range", index);
                false
            }
        }
    }

    /// Close the sheet without a pick; scanning resumes, no result is delivered
    pub fn dismiss_sheet(&self) -> bool {
        let (dismissed, _) = self.update(ScanAggregator::dismiss);
        if dismissed {
            self.metrics.record_sheet_dismissed();
            tracing::info!("Selection sheet dismissed; resuming scan");
        }
        dismissed
    }

    /// User cancelled: deliver Canceled and end the session
    pub fn cancel(&self) -> bool {
        self.finish(BarcodeResult::Canceled)
    }

    /// Camera or analyzer failure: deliver Failed and end the session
    pub fn fail(&self, error: ScanError) -> bool {
        tracing::error!("Scanning failed: {}", error);
        self.finish(BarcodeResult::Failed(error))
    }

    fn finish(&self, result: BarcodeResult) -> bool {
        let (result, _) = self.update(|state| {
            if !state.is_active() {
                return None;
            }
            Some(Self::record_result(state, result))
        });

        match result {
            Some(result) => {
                self.deliver(result);
                true
            }
            None => {
                tracing::debug!("Session already ended; terminal result dropped");
                false
            }
        }
    }

    // Camera pass-through

    /// Camera bound; `max_zoom_ratio` is fixed for the rest of the session
    pub fn on_camera_bound(&self, max_zoom_ratio: f32) -> Vec<SessionChange> {
        self.update(|state| {
            state.camera_bound = true;
            if state.max_zoom_reported {
                tracing::debug!(
                    "Ignoring max zoom report {}: already {}",
                    max_zoom_ratio,
                    state.max_zoom_ratio
                );
                return;
            }
            state.max_zoom_ratio = max_zoom_ratio.max(crate::models::MIN_ZOOM_RATIO);
            state.max_zoom_reported = true;
            state.zoom_ratio = state.clamp_zoom(state.zoom_ratio);
        })
        .1
    }

    pub fn on_camera_released(&self) -> Vec<SessionChange> {
        self.update(|state| {
            state.camera_bound = false;
        })
        .1
    }

    /// Actual torch state reported by the camera
    ///
    /// Always emits [`SessionChange::TorchChanged`], even when the cached state
    /// is unchanged: the switch may be showing a request the camera refused.
    pub fn on_torch_changed(&self, enabled: bool) -> Vec<SessionChange> {
        let (_, changes) = self.update(|state| {
            state.torch_enabled = enabled;
        });
        self.echo_if_unchanged(changes, SessionChange::TorchChanged { enabled })
    }

    /// Actual zoom ratio reported by the camera
    ///
    /// Always emits [`SessionChange::ZoomChanged`] so the slider snaps back to
    /// the applied ratio.
    pub fn on_zoom_changed(&self, ratio: f32) -> Vec<SessionChange> {
        let ((ratio, max_ratio), changes) = self.update(|state| {
            state.zoom_ratio = state.clamp_zoom(ratio);
            (state.zoom_ratio, state.max_zoom_ratio)
        });
        self.echo_if_unchanged(changes, SessionChange::ZoomChanged { ratio, max_ratio })
    }

    /// Emit `report` when an update changed nothing
    fn echo_if_unchanged(
        &self,
        mut changes: Vec<SessionChange>,
        report: SessionChange,
    ) -> Vec<SessionChange> {
        if changes.is_empty() {
            let _ = self.change_tx.send(report.clone());
            changes.push(report);
        }
        changes
    }

    /// Clamp a zoom request from the UI before it is forwarded to the camera
    pub fn clamp_zoom_request(&self, ratio: f32) -> f32 {
        self.read(|state| state.clamp_zoom(ratio))
    }
}

// Make SessionManager cloneable for sharing across callbacks and threads
impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            change_tx: self.change_tx.clone(),
            on_result: Arc::clone(&self.on_result),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

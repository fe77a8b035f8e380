use crate::models::barcode::{Barcode, BarcodeFormat, ResultKind};
use indexmap::IndexSet;

/// Lower bound of every zoom range; cameras start here.
pub const MIN_ZOOM_RATIO: f32 = 1.0;

/// Lifecycle phase of a scanning session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Frames are being aggregated and user intents are accepted
    Scanning,
    /// A cancel or failure was delivered; every further event is ignored
    Ended,
}

/// Transient state of one scanning session.
///
/// Owned by [`crate::state::SessionManager`], which is the only place that
/// mutates it. Every session starts from the defaults.
///
/// The pending set keeps first-seen order so the selection sheet lists codes
/// the way they appeared in the frames.
#[derive(Clone, Debug)]
pub struct ScanState {
    // Request
    pub formats: Vec<BarcodeFormat>,

    // Lifecycle
    pub phase: SessionPhase,
    pub camera_bound: bool,

    // Camera pass-through (last values reported by the backend)
    pub torch_enabled: bool,
    pub zoom_ratio: f32,
    pub max_zoom_ratio: f32,
    pub max_zoom_reported: bool,

    // Disambiguation
    pub pending: IndexSet<Barcode>,
    pub sheet_visible: bool,

    // Results
    pub results_delivered: usize,
    pub last_result: Option<ResultKind>,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            formats: Vec::new(),

            phase: SessionPhase::Scanning,
            camera_bound: false,

            torch_enabled: false,
            zoom_ratio: MIN_ZOOM_RATIO,
            max_zoom_ratio: MIN_ZOOM_RATIO,
            max_zoom_reported: false,

            pending: IndexSet::new(),
            sheet_visible: false,

            results_delivered: 0,
            last_result: None,
        }
    }
}

impl ScanState {
    /// Fresh state for a session accepting `formats`.
    pub fn for_formats(formats: Vec<BarcodeFormat>) -> Self {
        Self {
            formats,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Scanning
    }

    /// Clamp a requested zoom ratio into `[1.0, max_zoom_ratio]`.
    pub fn clamp_zoom(&self, ratio: f32) -> f32 {
        if ratio.is_nan() {
            return MIN_ZOOM_RATIO;
        }
        ratio.clamp(MIN_ZOOM_RATIO, self.max_zoom_ratio.max(MIN_ZOOM_RATIO))
    }

    /// Pending barcodes in first-seen order.
    pub fn pending_barcodes(&self) -> Vec<Barcode> {
        self.pending.iter().cloned().collect()
    }

    /// Drop the pending set and hide the sheet.
    pub fn close_sheet(&mut self) {
        self.pending.clear();
        self.sheet_visible = false;
    }
}

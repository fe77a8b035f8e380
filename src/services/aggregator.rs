use crate::models::{Barcode, ScanState};
use indexmap::IndexSet;

/// What the aggregator decided for one frame batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// Session ended or sheet open; state untouched
    Ignored,
    /// Empty batch; nothing to do
    NoMatch,
    /// Exactly one barcode: deliver it now
    Matched(Barcode),
    /// Several barcodes merged into the pending set; sheet is open
    Ambiguous { pending: usize },
}

/// Turns per-frame detection batches into scan decisions.
///
/// The rules, applied in order to a batch deduplicated by value:
/// 1. session ended or sheet visible: ignore the batch entirely
/// 2. one barcode: match it and clear the pending set
/// 3. several barcodes: union them into the pending set and open the sheet
/// 4. nothing: no-op
///
/// The single-match path does not deduplicate across frames, so the same
/// barcode seen in two consecutive frames yields two matches.
///
/// `ScanAggregator` is stateless; all state lives in [`ScanState`] so the
/// [`SessionManager`](crate::state::SessionManager) can diff it and emit events.
pub struct ScanAggregator;

impl ScanAggregator {
    /// Apply one frame batch.
    pub fn on_batch<I>(state: &mut ScanState, batch: I) -> BatchOutcome
    where
        I: IntoIterator<Item = Barcode>,
    {
        if !state.is_active() || state.sheet_visible {
            return BatchOutcome::Ignored;
        }

        let mut unique: IndexSet<Barcode> = batch.into_iter().collect();

        match unique.len() {
            0 => BatchOutcome::NoMatch,
            1 => {
                state.pending.clear();
                // len() == 1 guarantees a value
                match unique.pop() {
                    Some(barcode) => BatchOutcome::Matched(barcode),
                    None => BatchOutcome::NoMatch,
                }
            }
            _ => {
                state.pending.extend(unique);
                state.sheet_visible = true;
                BatchOutcome::Ambiguous {
                    pending: state.pending.len(),
                }
            }
        }
    }

    /// Resolve the sheet with the user's pick.
    ///
    /// Returns the picked barcode when the sheet is open and `barcode` is one
    /// of the pending codes; the pending set is cleared and the sheet closed.
    /// Anything else leaves the state untouched.
    pub fn select(state: &mut ScanState, barcode: &Barcode) -> Option<Barcode> {
        if !state.is_active() || !state.sheet_visible || !state.pending.contains(barcode) {
            return None;
        }

        state.close_sheet();
        Some(barcode.clone())
    }

    /// Close the sheet without a pick. Returns whether a sheet was open.
    pub fn dismiss(state: &mut ScanState) -> bool {
        if !state.sheet_visible {
            return false;
        }

        state.close_sheet();
        true
    }
}

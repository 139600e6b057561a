// 🔀 Reconciliation Engine - keep a local pin list in step with the server
//
// A reorder gesture moves one pin, renumbers the list and shows the result
// immediately. The change is then persisted; if any write fails the local
// list is thrown away and replaced by whatever the server now holds.
//
// Per gesture:
//   Idle → Dragging → (Resolved | Applying)
//   Applying → Committed → Idle
//   Applying → Failed → Refetching → Idle

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entities::Pin;
use crate::error::{StoreError, StoreResult};
use crate::ordering::{changed_orders, is_dense, reordered, validate_move, ReorderIssue};

/// Message shown when a reorder could not be saved.
pub const REVERT_MESSAGE: &str = "Failed to save new order. Reverting.";

// ============================================================================
// STORE SEAM
// ============================================================================

/// Reads and writes the reconciler needs from the pin collection.
pub trait PinStore {
    /// All pins of the trip, ordered by `order` ascending.
    fn fetch_pins(&self, trip_id: &str) -> StoreResult<Vec<Pin>>;

    /// Atomic server-side move of one pin to a zero-based position.
    fn reorder_pin(&self, moved_pin_id: &str, new_order_index: usize) -> StoreResult<()>;

    /// Single-row order write.
    fn update_pin_order(&self, pin_id: &str, order: i64) -> StoreResult<()>;
}

impl<S: PinStore + ?Sized> PinStore for &S {
    fn fetch_pins(&self, trip_id: &str) -> StoreResult<Vec<Pin>> {
        (**self).fetch_pins(trip_id)
    }

    fn reorder_pin(&self, moved_pin_id: &str, new_order_index: usize) -> StoreResult<()> {
        (**self).reorder_pin(moved_pin_id, new_order_index)
    }

    fn update_pin_order(&self, pin_id: &str, order: i64) -> StoreResult<()> {
        (**self).update_pin_order(pin_id, order)
    }
}

/// How a reorder is written back. Both leave the server in the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStrategy {
    /// One `reorder_pin` call.
    #[default]
    Atomic,
    /// `update_pin_order` for each pin whose order changed, in sequence.
    PerRow,
}

impl PersistStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistStrategy::Atomic => "atomic",
            PersistStrategy::PerRow => "per_row",
        }
    }
}

// ============================================================================
// GESTURE STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReorderPhase {
    Idle,
    Dragging { pin_id: String, source_index: usize },
    /// Dropped where it started, nothing to do.
    Resolved,
    Applying,
    Committed,
    Failed,
    Refetching,
}

/// An optimistic move that has been shown but not yet persisted.
/// Hand it to `PinListView::persist` or `PinListView::abort`.
#[must_use = "the view stays in `Applying` until the move is persisted or aborted"]
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReorder {
    pub moved_pin_id: String,
    pub source_index: usize,
    pub target_index: usize,
    previous: Vec<Pin>,
}

impl PendingReorder {
    /// The sequence as it was before the move.
    pub fn previous(&self) -> &[Pin] {
        &self.previous
    }
}

/// What happened to the local list after the refetch.
#[derive(Debug)]
pub enum Resync {
    Refetched,
    /// The refetch failed too; the view is in a retryable error state.
    FetchFailed(StoreError),
}

#[derive(Debug)]
pub enum ReorderOutcome {
    /// Validation failed or the gesture was a no-op. Nothing was written.
    Ignored(ReorderIssue),
    /// Every write succeeded; `writes` is the number of store calls made.
    Committed { writes: usize },
    /// A write failed. The local list was replaced from the server.
    Reverted { cause: StoreError, resync: Resync },
}

impl ReorderOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, ReorderOutcome::Committed { .. })
    }

    pub fn is_reverted(&self) -> bool {
        matches!(self, ReorderOutcome::Reverted { .. })
    }
}

// ============================================================================
// PIN LIST VIEW
// ============================================================================

/// The client-side ordered pin list for one trip.
#[derive(Debug, Clone)]
pub struct PinListView {
    trip_id: String,
    pins: Vec<Pin>,
    strategy: PersistStrategy,
    phase: ReorderPhase,
    error: Option<String>,
    retryable: bool,
    gesture_log: Vec<ReorderPhase>,
}

impl PinListView {
    /// Empty view; call `refresh` to populate.
    pub fn new(trip_id: impl Into<String>, strategy: PersistStrategy) -> Self {
        PinListView {
            trip_id: trip_id.into(),
            pins: Vec::new(),
            strategy,
            phase: ReorderPhase::Idle,
            error: None,
            retryable: false,
            gesture_log: Vec::new(),
        }
    }

    /// Build a view from a first fetch.
    pub fn load<S: PinStore + ?Sized>(
        store: &S,
        trip_id: impl Into<String>,
        strategy: PersistStrategy,
    ) -> StoreResult<Self> {
        let mut view = PinListView::new(trip_id, strategy);
        view.pins = store.fetch_pins(&view.trip_id)?;
        Ok(view)
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    pub fn strategy(&self) -> PersistStrategy {
        self.strategy
    }

    pub fn phase(&self) -> &ReorderPhase {
        &self.phase
    }

    /// User-visible error, if the last operation left one.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the last failed load is worth retrying with `refresh`.
    pub fn can_retry(&self) -> bool {
        self.retryable
    }

    /// Phases visited by the most recent gesture, in order.
    pub fn gesture_log(&self) -> &[ReorderPhase] {
        &self.gesture_log
    }

    /// Re-read the list from the server. On failure the current pins are
    /// kept and the error is recorded so the caller can offer a retry.
    ///
    /// A move left in `Applying` without being persisted is discarded: the
    /// server list replaces it and the view returns to `Idle`.
    pub fn refresh<S: PinStore + ?Sized>(&mut self, store: &S) -> StoreResult<()> {
        let pins = self.fetch(store)?;
        if self.phase == ReorderPhase::Applying {
            warn!(trip_id = %self.trip_id, "discarding unsaved reorder");
            self.enter(ReorderPhase::Idle);
        }
        self.pins = pins;
        self.error = None;
        self.retryable = false;
        Ok(())
    }

    fn fetch<S: PinStore + ?Sized>(&mut self, store: &S) -> StoreResult<Vec<Pin>> {
        store.fetch_pins(&self.trip_id).map_err(|e| {
            warn!(trip_id = %self.trip_id, error = %e, "failed to load pins");
            self.error = Some(format!("Failed to load pins: {}", e));
            self.retryable = e.is_retryable();
            e
        })
    }

    /// Start dragging a pin. Only one gesture runs at a time.
    pub fn begin_drag(&mut self, pin_id: &str) -> Result<usize, ReorderIssue> {
        if self.phase != ReorderPhase::Idle {
            return Err(ReorderIssue::Busy);
        }
        let source_index = self
            .pins
            .iter()
            .position(|p| p.id == pin_id)
            .ok_or_else(|| ReorderIssue::UnknownPin(pin_id.to_string()))?;

        self.gesture_log.clear();
        self.enter(ReorderPhase::Dragging {
            pin_id: pin_id.to_string(),
            source_index,
        });
        Ok(source_index)
    }

    /// Abandon a drag before it is dropped.
    pub fn cancel_drag(&mut self) {
        if matches!(self.phase, ReorderPhase::Dragging { .. }) {
            self.enter(ReorderPhase::Resolved);
            self.enter(ReorderPhase::Idle);
        }
    }

    /// Drop the dragged pin at `target_index` and persist.
    pub fn drop_at<S: PinStore + ?Sized>(
        &mut self,
        store: &S,
        target_index: usize,
    ) -> ReorderOutcome {
        let ReorderPhase::Dragging {
            pin_id,
            source_index,
        } = self.phase.clone()
        else {
            return ReorderOutcome::Ignored(ReorderIssue::NoGesture);
        };

        match self.apply_optimistic(&pin_id, source_index, target_index) {
            Ok(pending) => self.persist(store, pending),
            Err(issue) => ReorderOutcome::Ignored(issue),
        }
    }

    /// A whole gesture in one call: drag `moved_pin_id` from `source_index`
    /// to `target_index`.
    pub fn reorder<S: PinStore + ?Sized>(
        &mut self,
        store: &S,
        moved_pin_id: &str,
        source_index: usize,
        target_index: usize,
    ) -> ReorderOutcome {
        if self.phase != ReorderPhase::Idle {
            return ReorderOutcome::Ignored(ReorderIssue::Busy);
        }
        self.gesture_log.clear();
        self.enter(ReorderPhase::Dragging {
            pin_id: moved_pin_id.to_string(),
            source_index,
        });

        match self.apply_optimistic(moved_pin_id, source_index, target_index) {
            Ok(pending) => self.persist(store, pending),
            Err(issue) => ReorderOutcome::Ignored(issue),
        }
    }

    /// Validate and show the move locally. On success the view is in
    /// `Applying` and the returned value must be passed to `persist` or `abort`.
    /// On a validation issue the gesture resolves back to `Idle`.
    pub fn apply_optimistic(
        &mut self,
        moved_pin_id: &str,
        source_index: usize,
        target_index: usize,
    ) -> Result<PendingReorder, ReorderIssue> {
        match self.phase {
            ReorderPhase::Idle => {
                self.gesture_log.clear();
                self.enter(ReorderPhase::Dragging {
                    pin_id: moved_pin_id.to_string(),
                    source_index,
                });
            }
            ReorderPhase::Dragging { .. } => {}
            _ => return Err(ReorderIssue::Busy),
        }

        if let Err(issue) = validate_move(&self.pins, moved_pin_id, source_index, target_index) {
            debug!(trip_id = %self.trip_id, %issue, "reorder ignored");
            self.enter(ReorderPhase::Resolved);
            self.enter(ReorderPhase::Idle);
            return Err(issue);
        }

        let next = reordered(&self.pins, moved_pin_id, source_index, target_index)?;
        let previous = std::mem::replace(&mut self.pins, next);
        self.error = None;
        self.retryable = false;
        self.enter(ReorderPhase::Applying);

        Ok(PendingReorder {
            moved_pin_id: moved_pin_id.to_string(),
            source_index,
            target_index,
            previous,
        })
    }

    /// Write an applied move back to the store.
    pub fn persist<S: PinStore + ?Sized>(
        &mut self,
        store: &S,
        pending: PendingReorder,
    ) -> ReorderOutcome {
        if self.phase != ReorderPhase::Applying {
            return ReorderOutcome::Ignored(ReorderIssue::NoGesture);
        }

        match self.write(store, &pending) {
            Ok(writes) => {
                info!(
                    trip_id = %self.trip_id,
                    moved_pin_id = %pending.moved_pin_id,
                    from = pending.source_index,
                    to = pending.target_index,
                    strategy = self.strategy.as_str(),
                    writes,
                    "reorder committed"
                );
                self.enter(ReorderPhase::Committed);
                self.enter(ReorderPhase::Idle);
                ReorderOutcome::Committed { writes }
            }
            Err(cause) => {
                warn!(
                    trip_id = %self.trip_id,
                    moved_pin_id = %pending.moved_pin_id,
                    error = %cause,
                    "reorder failed, refetching"
                );
                self.enter(ReorderPhase::Failed);
                self.enter(ReorderPhase::Refetching);

                let resync = match self.fetch(store) {
                    Ok(pins) => {
                        if !is_dense(&pins) {
                            warn!(trip_id = %self.trip_id, "server order left with gaps or duplicates");
                        }
                        self.pins = pins;
                        self.error = Some(REVERT_MESSAGE.to_string());
                        Resync::Refetched
                    }
                    Err(e) => Resync::FetchFailed(e),
                };

                self.enter(ReorderPhase::Idle);
                ReorderOutcome::Reverted { cause, resync }
            }
        }
    }

    /// Drop an applied move without writing it. The previous sequence comes
    /// back and the gesture resolves to `Idle`.
    pub fn abort(&mut self, pending: PendingReorder) -> Result<(), ReorderIssue> {
        if self.phase != ReorderPhase::Applying {
            return Err(ReorderIssue::NoGesture);
        }
        debug!(trip_id = %self.trip_id, moved_pin_id = %pending.moved_pin_id, "reorder aborted");
        self.pins = pending.previous;
        self.enter(ReorderPhase::Resolved);
        self.enter(ReorderPhase::Idle);
        Ok(())
    }

    fn write<S: PinStore + ?Sized>(
        &self,
        store: &S,
        pending: &PendingReorder,
    ) -> StoreResult<usize> {
        match self.strategy {
            PersistStrategy::Atomic => {
                store.reorder_pin(&pending.moved_pin_id, pending.target_index)?;
                Ok(1)
            }
            PersistStrategy::PerRow => {
                let changes = changed_orders(&pending.previous, &self.pins);
                for (pin_id, order) in &changes {
                    store.update_pin_order(pin_id, *order)?;
                }
                Ok(changes.len())
            }
        }
    }

    fn enter(&mut self, phase: ReorderPhase) {
        debug!(trip_id = %self.trip_id, ?phase, "reorder phase");
        self.gesture_log.push(phase.clone());
        self.phase = phase;
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! # Update Loop
//!
//! Owns one [`StageRegistry`] per stage and performs dispatch.
//!
//! `UpdateLoop` is a cheap `Rc` handle: clone it into whatever needs to create
//! subscription handles. It is neither `Send` nor `Sync`; every registry is
//! mutated only from the thread that drives the loop.
//!
//! ## Dispatch and mutation
//!
//! `run_stage` takes the entry count as a snapshot, then walks positions
//! `0..snapshot`, borrowing the registry only long enough to fetch each entry.
//! Callbacks are therefore free to register, unregister or drop handles, with
//! these consequences for the pass that is in progress:
//!
//! - a removal moves the last entry into the vacated slot; if that slot was
//!   already visited, the moved entry is skipped until the next pass
//! - an entry removed and re-added during the pass lands at the tail and is
//!   visited a second time if the tail is still inside the snapshot
//! - entries appended past the snapshot wait for the next pass
//! - if the registry shrinks below the current position the pass ends early
//!
//! Every subscriber that stays registered through a whole pass without the
//! set being mutated is invoked exactly once.

use crate::config::LoopConfig;
use crate::primitives::STAGE_COUNT;
use crate::registry::StageRegistry;
use crate::report::{DispatchReport, FrameReport};
use crate::{HandleId, NetloopError, Stage, UpdateHandle, UpdateSystem};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

thread_local! {
    static CURRENT_STAGE: Cell<Option<Stage>> = const { Cell::new(None) };
}

/// The stage being dispatched on this thread, or `None` outside a callback.
///
/// When loops are nested (a callback of one loop drives another loop), this
/// reports the innermost stage and reverts to the outer one afterwards.
#[must_use]
pub fn current_stage() -> Option<Stage> {
    CURRENT_STAGE.with(Cell::get)
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct Shared {
    registries: [RefCell<StageRegistry>; STAGE_COUNT],
    active: Cell<Option<Stage>>,
    next_handle: Cell<u64>,
    config: LoopConfig,
}

/// Marks a stage as active for as long as it lives.
///
/// Restoring happens in `Drop`, so a panicking callback cannot leave the
/// marker set.
struct ActiveStage<'a> {
    active: &'a Cell<Option<Stage>>,
    outer: Option<Stage>,
}

impl<'a> ActiveStage<'a> {
    fn enter(active: &'a Cell<Option<Stage>>, stage: Stage) -> Result<Self, NetloopError> {
        if let Some(running) = active.get() {
            return Err(NetloopError::DispatchInProgress {
                active: running,
                requested: stage,
            });
        }
        active.set(Some(stage));
        let outer = CURRENT_STAGE.with(|current| current.replace(Some(stage)));
        Ok(Self { active, outer })
    }
}

impl Drop for ActiveStage<'_> {
    fn drop(&mut self) {
        self.active.set(None);
        CURRENT_STAGE.with(|current| current.set(self.outer));
    }
}

// =============================================================================
// UPDATE LOOP
// =============================================================================

/// Per-stage subscriber registries plus the dispatch entry points.
#[derive(Clone)]
pub struct UpdateLoop {
    shared: Rc<Shared>,
}

impl Default for UpdateLoop {
    fn default() -> Self {
        Self::build(LoopConfig::default())
    }
}

impl std::fmt::Debug for UpdateLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: Vec<(Stage, usize)> = Stage::ALL
            .iter()
            .map(|stage| (*stage, self.subscriber_count(*stage)))
            .collect();
        f.debug_struct("UpdateLoop")
            .field("active", &self.active_stage())
            .field("subscribers", &counts)
            .field("config", &self.shared.config)
            .finish()
    }
}

impl UpdateLoop {
    /// Create a loop with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loop with custom settings.
    pub fn with_config(config: LoopConfig) -> Result<Self, NetloopError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: LoopConfig) -> Self {
        let registries =
            Stage::ALL.map(|stage| RefCell::new(StageRegistry::with_config(stage, &config)));
        Self {
            shared: Rc::new(Shared {
                registries,
                active: Cell::new(None),
                next_handle: Cell::new(1),
                config,
            }),
        }
    }

    pub(crate) fn registry(&self, stage: Stage) -> &RefCell<StageRegistry> {
        &self.shared.registries[stage.index()]
    }

    /// Create a subscription handle for `system`.
    ///
    /// The loop keeps only a weak reference to the subscriber. A subscriber
    /// may own its handle; it is then unregistered everywhere when its last
    /// strong reference goes away.
    pub fn create_handle<S>(&self, system: &Rc<RefCell<S>>) -> UpdateHandle
    where
        S: UpdateSystem + 'static,
    {
        let system: Rc<RefCell<dyn UpdateSystem>> = system.clone();
        let id = self.shared.next_handle.get();
        self.shared.next_handle.set(id.saturating_add(1));
        UpdateHandle::new(self.clone(), Rc::downgrade(&system), HandleId(id))
    }

    /// Invoke every subscriber of `stage` once, in dispatch order.
    ///
    /// Busy or dropped subscribers are counted and skipped; they never stop
    /// the rest of the stage. Fails only if called while this loop is
    /// already dispatching.
    pub fn run_stage(&self, stage: Stage) -> Result<DispatchReport, NetloopError> {
        let _marker = ActiveStage::enter(&self.shared.active, stage)?;
        let registry = self.registry(stage);

        let snapshot = registry.borrow().len();
        let mut report = DispatchReport::new(stage, snapshot);

        for position in 0..snapshot {
            let entry = registry.borrow().entry_at(position);
            let Some((id, weak)) = entry else {
                report.truncated = true;
                break;
            };

            let Some(system) = weak.upgrade() else {
                report.expired += 1;
                tracing::trace!(%stage, id = id.get(), "subscriber dropped before its handle");
                continue;
            };

            match system.try_borrow_mut() {
                Ok(mut system) => {
                    system.network_update(stage);
                    report.invoked += 1;
                }
                Err(_) => {
                    report.busy += 1;
                    tracing::warn!(%stage, id = id.get(), "subscriber already borrowed, skipped");
                }
            }
        }

        tracing::trace!(
            %stage,
            invoked = report.invoked,
            skipped = report.skipped(),
            "stage dispatched"
        );
        Ok(report)
    }

    /// Run every stage once, in [`Stage::ALL`] order.
    pub fn run_frame(&self) -> Result<FrameReport, NetloopError> {
        let mut frame = FrameReport::new();
        for stage in Stage::ALL {
            frame.push(self.run_stage(stage)?);
        }
        Ok(frame)
    }

    /// The stage this loop is dispatching right now.
    #[must_use]
    pub fn active_stage(&self) -> Option<Stage> {
        self.shared.active.get()
    }

    /// Settings this loop was built with.
    #[must_use]
    pub fn config(&self) -> LoopConfig {
        self.shared.config
    }

    /// Number of active subscribers in `stage`.
    #[must_use]
    pub fn subscriber_count(&self, stage: Stage) -> usize {
        self.registry(stage).borrow().len()
    }

    /// Owning handles of `stage`, in dispatch order.
    #[must_use]
    pub fn subscribers(&self, stage: Stage) -> Vec<HandleId> {
        self.registry(stage).borrow().owners().collect()
    }

    /// Highest identity `stage` has issued.
    #[must_use]
    pub fn issued(&self, stage: Stage) -> u32 {
        self.registry(stage).borrow().issued()
    }

    /// Identities `stage` can still issue.
    #[must_use]
    pub fn remaining(&self, stage: Stage) -> u32 {
        self.registry(stage).borrow().remaining()
    }

    /// Check the position index of every registry.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.shared
            .registries
            .iter()
            .all(|registry| registry.borrow().is_consistent())
    }

    /// Check whether two values refer to the same loop.
    #[must_use]
    pub fn ptr_eq(&self, other: &UpdateLoop) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Rc<RefCell<Vec<(u32, Stage)>>>;

    fn recorder(tag: u32, log: &Log) -> Rc<RefCell<impl UpdateSystem + 'static>> {
        let log = Rc::clone(log);
        Rc::new(RefCell::new(move |stage: Stage| log.borrow_mut().push((tag, stage))))
    }

    #[test]
    fn empty_stage_dispatches_nothing() {
        let update_loop = UpdateLoop::new();
        let report = update_loop.run_stage(Stage::Update).expect("dispatch");
        assert_eq!(report, DispatchReport::new(Stage::Update, 0));
    }

    #[test]
    fn stage_is_passed_and_marked_active() {
        let update_loop = UpdateLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let watcher = {
            let seen = Rc::clone(&seen);
            let inner = update_loop.clone();
            Rc::new(RefCell::new(move |stage: Stage| {
                seen.borrow_mut()
                    .push((stage, inner.active_stage(), current_stage()));
            }))
        };
        let mut handle = update_loop.create_handle(&watcher);
        let _ = handle.register(Stage::PreUpdate).expect("register");

        assert_eq!(current_stage(), None);
        let _ = update_loop.run_stage(Stage::PreUpdate).expect("dispatch");
        assert_eq!(current_stage(), None);
        assert_eq!(update_loop.active_stage(), None);

        assert_eq!(
            *seen.borrow(),
            vec![(Stage::PreUpdate, Some(Stage::PreUpdate), Some(Stage::PreUpdate))]
        );
    }

    #[test]
    fn nested_dispatch_is_rejected() {
        let update_loop = UpdateLoop::new();
        let outcome = Rc::new(RefCell::new(None));
        let watcher = {
            let outcome = Rc::clone(&outcome);
            let inner = update_loop.clone();
            Rc::new(RefCell::new(move |_stage: Stage| {
                *outcome.borrow_mut() = Some(inner.run_stage(Stage::Update));
            }))
        };
        let mut handle = update_loop.create_handle(&watcher);
        let _ = handle.register(Stage::EarlyUpdate).expect("register");
        let _ = update_loop.run_stage(Stage::EarlyUpdate).expect("dispatch");

        assert_eq!(
            outcome.borrow_mut().take(),
            Some(Err(NetloopError::DispatchInProgress {
                active: Stage::EarlyUpdate,
                requested: Stage::Update,
            }))
        );
    }

    #[test]
    fn separate_loops_nest_and_restore_current_stage() {
        let outer = UpdateLoop::new();
        let inner = UpdateLoop::new();
        let seen: Rc<RefCell<Vec<(&str, Option<Stage>)>>> = Rc::default();

        let inner_system = {
            let seen = Rc::clone(&seen);
            Rc::new(RefCell::new(move |_stage: Stage| {
                seen.borrow_mut().push(("inner", current_stage()));
            }))
        };
        let mut inner_handle = inner.create_handle(&inner_system);
        let _ = inner_handle.register(Stage::Update).expect("register");

        let outer_system = {
            let seen = Rc::clone(&seen);
            let inner = inner.clone();
            Rc::new(RefCell::new(move |_stage: Stage| {
                let report = inner.run_stage(Stage::Update).expect("inner dispatch");
                assert_eq!(report.invoked, 1);
                seen.borrow_mut().push(("outer-after", current_stage()));
            }))
        };
        let mut outer_handle = outer.create_handle(&outer_system);
        let _ = outer_handle.register(Stage::EarlyUpdate).expect("register");

        let _ = outer.run_stage(Stage::EarlyUpdate).expect("outer dispatch");

        assert_eq!(
            *seen.borrow(),
            vec![
                ("inner", Some(Stage::Update)),
                ("outer-after", Some(Stage::EarlyUpdate)),
            ]
        );
        assert_eq!(current_stage(), None);
        assert_eq!(inner.active_stage(), None);
        assert_eq!(outer.active_stage(), None);
    }

    #[test]
    fn busy_subscriber_is_skipped_not_fatal() {
        let update_loop = UpdateLoop::new();
        let log: Log = Rc::default();
        let a = recorder(1, &log);
        let b = recorder(2, &log);
        let mut ha = update_loop.create_handle(&a);
        let mut hb = update_loop.create_handle(&b);
        let _ = ha.register(Stage::Update).expect("register");
        let _ = hb.register(Stage::Update).expect("register");

        let held = a.borrow_mut();
        let report = update_loop.run_stage(Stage::Update).expect("dispatch");
        drop(held);

        assert_eq!(report.busy, 1);
        assert_eq!(report.invoked, 1);
        assert_eq!(*log.borrow(), vec![(2, Stage::Update)]);
    }

    #[test]
    fn dropped_subscriber_counts_as_expired() {
        let update_loop = UpdateLoop::new();
        let log: Log = Rc::default();
        let a = recorder(1, &log);
        let mut handle = update_loop.create_handle(&a);
        let _ = handle.register(Stage::Update).expect("register");

        drop(a);
        let report = update_loop.run_stage(Stage::Update).expect("dispatch");
        assert_eq!(report.expired, 1);
        assert_eq!(report.invoked, 0);
        assert_eq!(update_loop.subscriber_count(Stage::Update), 1);

        drop(handle);
        assert_eq!(update_loop.subscriber_count(Stage::Update), 0);
    }

    #[test]
    fn run_frame_visits_stages_in_order() {
        let update_loop = UpdateLoop::new();
        let log: Log = Rc::default();
        let a = recorder(1, &log);
        let mut handle = update_loop.create_handle(&a);
        let _ = handle.register_all().expect("register");

        let frame = update_loop.run_frame().expect("frame");
        assert_eq!(frame.stage_sequence().collect::<Vec<_>>(), Stage::ALL.to_vec());
        let stages: Vec<Stage> = log.borrow().iter().map(|(_, s)| *s).collect();
        assert_eq!(stages, Stage::ALL.to_vec());
    }

    #[test]
    fn invalid_config_rejected() {
        let result = UpdateLoop::with_config(LoopConfig::default().with_id_limit(0));
        assert!(matches!(result, Err(NetloopError::InvalidConfig(_))));
    }

    #[test]
    fn handle_ids_are_unique_per_loop() {
        let update_loop = UpdateLoop::new();
        let log: Log = Rc::default();
        let a = recorder(1, &log);
        let h1 = update_loop.create_handle(&a);
        let h2 = update_loop.create_handle(&a);
        assert_ne!(h1.handle_id(), h2.handle_id());
    }
}

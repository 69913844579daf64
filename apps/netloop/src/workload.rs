//! # Synthetic Workload
//!
//! A population of tally subscribers that count the stages they are
//! invoked for. Used by `netloop run` to exercise registration, dispatch
//! and release under a configurable registration pattern.

use crate::config::{Pattern, WorkloadConfig};
use netloop_core::{NetloopError, STAGE_COUNT, Stage, UpdateHandle, UpdateLoop, UpdateSystem};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// =============================================================================
// TALLY SUBSCRIBER
// =============================================================================

/// Counts invocations per stage.
///
/// `frame_sum` adds the current frame number on every call, so two runs that
/// dispatch the same stages on different frames can be told apart.
#[derive(Debug)]
pub struct Tally {
    frame: Rc<Cell<u64>>,
    counts: [u64; STAGE_COUNT],
    frame_sum: [u64; STAGE_COUNT],
}

impl Tally {
    pub fn new(frame: Rc<Cell<u64>>) -> Self {
        Self {
            frame,
            counts: [0; STAGE_COUNT],
            frame_sum: [0; STAGE_COUNT],
        }
    }

    pub fn count(&self, stage: Stage) -> u64 {
        self.counts[stage.index()]
    }

    pub fn frame_sum(&self, stage: Stage) -> u64 {
        self.frame_sum[stage.index()]
    }
}

impl UpdateSystem for Tally {
    fn network_update(&mut self, stage: Stage) {
        let slot = stage.index();
        self.counts[slot] = self.counts[slot].saturating_add(1);
        self.frame_sum[slot] = self.frame_sum[slot].wrapping_add(self.frame.get());
    }
}

/// Stages subscriber `index` registers for under `pattern`.
pub fn stages_for(pattern: Pattern, index: usize, custom: &[Stage]) -> Vec<Stage> {
    match pattern {
        Pattern::All => Stage::ALL.to_vec(),
        Pattern::Default => vec![Stage::default()],
        Pattern::Stages => custom.to_vec(),
        Pattern::Cycle => match index % 5 {
            0 => Stage::ALL.to_vec(),
            1 => vec![Stage::FixedUpdate, Stage::Update, Stage::PreLateUpdate],
            2 => vec![Stage::EarlyUpdate, Stage::PreUpdate, Stage::PostLateUpdate],
            3 => vec![Stage::Initialization, Stage::FixedUpdate],
            _ => vec![Stage::default()],
        },
    }
}

// =============================================================================
// WORKLOAD
// =============================================================================

struct Member {
    tally: Rc<RefCell<Tally>>,
    handle: UpdateHandle,
    stages: Vec<Stage>,
}

/// The tally population and its handles.
pub struct Workload {
    update_loop: UpdateLoop,
    frame: Rc<Cell<u64>>,
    members: Vec<Member>,
    churn_every: u64,
    churn_rounds: u64,
    released: u64,
}

impl std::fmt::Debug for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workload")
            .field("members", &self.members.len())
            .field("churn_every", &self.churn_every)
            .field("released", &self.released)
            .finish()
    }
}

impl Workload {
    /// Create every subscriber described by `config` and register it.
    pub fn build(update_loop: &UpdateLoop, config: &WorkloadConfig) -> Result<Self, NetloopError> {
        let frame = Rc::new(Cell::new(0));
        let mut members = Vec::with_capacity(config.subscribers);

        for index in 0..config.subscribers {
            let tally = Rc::new(RefCell::new(Tally::new(Rc::clone(&frame))));
            let stages = stages_for(config.pattern, index, &config.stages);
            let mut handle = update_loop.create_handle(&tally);
            let _ = handle.register_many(&stages)?;
            members.push(Member {
                tally,
                handle,
                stages,
            });
        }

        tracing::info!(
            subscribers = members.len(),
            pattern = %config.pattern,
            "workload registered"
        );

        Ok(Self {
            update_loop: update_loop.clone(),
            frame,
            members,
            churn_every: config.churn_every,
            churn_rounds: 0,
            released: 0,
        })
    }

    /// Publish the frame number tallies add into `frame_sum`.
    pub fn begin_frame(&self, frame: u64) {
        self.frame.set(frame);
    }

    /// Apply churn after `frame` (1-based) has been driven.
    ///
    /// Every `churn_every` frames, every other subscriber drops its handle and
    /// re-registers through a fresh one. Alternate rounds pick the other half.
    /// Returns how many handles were replaced.
    pub fn end_frame(&mut self, frame: u64) -> Result<usize, NetloopError> {
        if self.churn_every == 0 || frame % self.churn_every != 0 {
            return Ok(0);
        }

        let parity = (self.churn_rounds % 2) as usize;
        self.churn_rounds = self.churn_rounds.saturating_add(1);
        let mut replaced = 0;

        for member in self.members.iter_mut().skip(parity).step_by(2) {
            let mut handle = self.update_loop.create_handle(&member.tally);
            let _ = handle.register_many(&member.stages)?;
            // Assigning drops the old handle, releasing its identities.
            member.handle = handle;
            replaced += 1;
        }

        self.released = self.released.saturating_add(replaced as u64);
        tracing::debug!(frame, replaced, "workload churned");
        Ok(replaced)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Handles replaced by churn so far.
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Active registrations per stage, summed over the population.
    pub fn registrations(&self) -> [usize; STAGE_COUNT] {
        let mut out = [0; STAGE_COUNT];
        for member in &self.members {
            for stage in member.handle.active_stages() {
                out[stage.index()] += 1;
            }
        }
        out
    }

    /// Invocations per stage as observed by the tallies themselves.
    pub fn observed(&self) -> [u64; STAGE_COUNT] {
        let mut out: [u64; STAGE_COUNT] = [0; STAGE_COUNT];
        for member in &self.members {
            let tally = member.tally.borrow();
            for stage in Stage::ALL {
                out[stage.index()] = out[stage.index()].saturating_add(tally.count(stage));
            }
        }
        out
    }

    /// Frame-weighted invocation sums per stage.
    pub fn frame_sums(&self) -> [u64; STAGE_COUNT] {
        let mut out: [u64; STAGE_COUNT] = [0; STAGE_COUNT];
        for member in &self.members {
            let tally = member.tally.borrow();
            for stage in Stage::ALL {
                out[stage.index()] = out[stage.index()].wrapping_add(tally.frame_sum(stage));
            }
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # Dispatch Reports
//!
//! Counters returned by `run_stage`, `run_frame` and loop drivers. Reports
//! are plain data so hosts can log or serialize them as they like.

use crate::Stage;
use crate::primitives::STAGE_COUNT;
use serde::{Deserialize, Serialize};

// =============================================================================
// SINGLE DISPATCH
// =============================================================================

/// What happened during one `run_stage` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// The stage that was dispatched.
    pub stage: Stage,
    /// Entry count when dispatch started.
    pub snapshot: usize,
    /// Subscribers whose callback ran.
    pub invoked: usize,
    /// Entries whose subscriber had already been dropped.
    pub expired: usize,
    /// Subscribers skipped because they were already mutably borrowed.
    pub busy: usize,
    /// The registry shrank below the snapshot while dispatching.
    pub truncated: bool,
}

impl DispatchReport {
    /// Empty report for a dispatch that starts with `snapshot` entries.
    #[must_use]
    pub fn new(stage: Stage, snapshot: usize) -> Self {
        Self {
            stage,
            snapshot,
            invoked: 0,
            expired: 0,
            busy: 0,
            truncated: false,
        }
    }

    /// Entries that were looked at but not invoked.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.expired.saturating_add(self.busy)
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// Every dispatch performed while driving one frame, in order.
///
/// A stage may appear zero times (the driver skipped it) or several times
/// (fixed-rate stages catching up).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameReport {
    pub dispatches: Vec<DispatchReport>,
}

impl FrameReport {
    /// Create an empty frame report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one dispatch.
    pub fn push(&mut self, report: DispatchReport) {
        self.dispatches.push(report);
    }

    /// How many times `stage` was dispatched this frame.
    #[must_use]
    pub fn runs(&self, stage: Stage) -> usize {
        self.for_stage(stage).count()
    }

    /// Callbacks invoked for `stage` this frame.
    #[must_use]
    pub fn invoked(&self, stage: Stage) -> usize {
        self.for_stage(stage).map(|r| r.invoked).sum()
    }

    /// Callbacks invoked across all stages this frame.
    #[must_use]
    pub fn total_invoked(&self) -> usize {
        self.dispatches.iter().map(|r| r.invoked).sum()
    }

    /// Stages in the order they were dispatched.
    pub fn stage_sequence(&self) -> impl Iterator<Item = Stage> + '_ {
        self.dispatches.iter().map(|r| r.stage)
    }

    fn for_stage(&self, stage: Stage) -> impl Iterator<Item = &DispatchReport> + '_ {
        self.dispatches.iter().filter(move |r| r.stage == stage)
    }
}

// =============================================================================
// RUN TOTALS
// =============================================================================

/// Totals accumulated over many frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub frames: u64,
    /// Dispatch count per stage, indexed by [`Stage::index`].
    pub dispatches: [u64; STAGE_COUNT],
    /// Invocation count per stage, indexed by [`Stage::index`].
    pub invocations: [u64; STAGE_COUNT],
    pub expired: u64,
    pub busy: u64,
}

impl RunTotals {
    /// Create empty totals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into the totals.
    pub fn record(&mut self, frame: &FrameReport) {
        self.frames = self.frames.saturating_add(1);
        for report in &frame.dispatches {
            let i = report.stage.index();
            self.dispatches[i] = self.dispatches[i].saturating_add(1);
            self.invocations[i] = self.invocations[i].saturating_add(report.invoked as u64);
            self.expired = self.expired.saturating_add(report.expired as u64);
            self.busy = self.busy.saturating_add(report.busy as u64);
        }
    }

    /// Invocations recorded for `stage`.
    #[must_use]
    pub fn invocations_for(&self, stage: Stage) -> u64 {
        self.invocations[stage.index()]
    }

    /// Dispatches recorded for `stage`.
    #[must_use]
    pub fn dispatches_for(&self, stage: Stage) -> u64 {
        self.dispatches[stage.index()]
    }

    /// Invocations across all stages.
    #[must_use]
    pub fn total_invocations(&self) -> u64 {
        self.invocations.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(stage: Stage, invoked: usize) -> DispatchReport {
        DispatchReport {
            invoked,
            ..DispatchReport::new(stage, invoked)
        }
    }

    #[test]
    fn frame_report_sums_repeated_stages() {
        let mut frame = FrameReport::new();
        frame.push(report(Stage::EarlyUpdate, 2));
        frame.push(report(Stage::FixedUpdate, 3));
        frame.push(report(Stage::FixedUpdate, 3));
        frame.push(report(Stage::Update, 1));

        assert_eq!(frame.runs(Stage::FixedUpdate), 2);
        assert_eq!(frame.invoked(Stage::FixedUpdate), 6);
        assert_eq!(frame.runs(Stage::PostLateUpdate), 0);
        assert_eq!(frame.total_invoked(), 9);
    }

    #[test]
    fn run_totals_accumulate_frames() {
        let mut frame = FrameReport::new();
        frame.push(DispatchReport {
            expired: 1,
            ..report(Stage::Update, 4)
        });

        let mut totals = RunTotals::new();
        totals.record(&frame);
        totals.record(&frame);

        assert_eq!(totals.frames, 2);
        assert_eq!(totals.invocations_for(Stage::Update), 8);
        assert_eq!(totals.dispatches_for(Stage::Update), 2);
        assert_eq!(totals.dispatches_for(Stage::Initialization), 0);
        assert_eq!(totals.expired, 2);
        assert_eq!(totals.total_invocations(), 8);
    }

    #[test]
    fn skipped_counts_expired_and_busy() {
        let r = DispatchReport {
            expired: 2,
            busy: 1,
            ..DispatchReport::new(Stage::Update, 5)
        };
        assert_eq!(r.skipped(), 3);
    }
}

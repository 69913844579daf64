//! # Run Report
//!
//! Serializable summary of a host run, printed by `netloop run` as text or
//! JSON (`--json-mode`).

use crate::workload::Workload;
use netloop_core::{RunTotals, Stage, UpdateLoop};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Per-stage line of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    /// Times the stage was dispatched.
    pub dispatches: u64,
    /// Callbacks counted by the dispatcher.
    pub invocations: u64,
    /// Callbacks counted by the tallies themselves.
    pub observed: u64,
    /// Active registrations at the end of the run.
    pub registered: usize,
    /// Identities issued by the stage so far.
    pub issued: u32,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub frames: u64,
    pub interrupted: bool,
    pub fixed_steps: u64,
    pub subscribers: usize,
    /// Handles replaced by churn.
    pub churned: u64,
    pub expired: u64,
    pub busy: u64,
    pub stages: Vec<StageSummary>,
}

impl RunReport {
    pub fn collect(
        update_loop: &UpdateLoop,
        workload: &Workload,
        totals: &RunTotals,
        fixed_steps: u64,
        interrupted: bool,
    ) -> Self {
        let observed = workload.observed();
        let stages = Stage::ALL
            .into_iter()
            .map(|stage| StageSummary {
                stage,
                dispatches: totals.dispatches_for(stage),
                invocations: totals.invocations_for(stage),
                observed: observed[stage.index()],
                registered: update_loop.subscriber_count(stage),
                issued: update_loop.issued(stage),
            })
            .collect();

        Self {
            frames: totals.frames,
            interrupted,
            fixed_steps,
            subscribers: workload.len(),
            churned: workload.released(),
            expired: totals.expired,
            busy: totals.busy,
            stages,
        }
    }

    /// Dispatcher and tally counts agree for every stage.
    pub fn is_balanced(&self) -> bool {
        self.stages.iter().all(|s| s.invocations == s.observed)
    }

    pub fn total_invocations(&self) -> u64 {
        self.stages.iter().map(|s| s.invocations).sum()
    }

    /// Human-readable table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "netloop Run Report");
        let _ = writeln!(out, "==================");
        let _ = writeln!(out, "Frames:       {}", self.frames);
        if self.interrupted {
            let _ = writeln!(out, "Interrupted:  yes");
        }
        let _ = writeln!(out, "Fixed Steps:  {}", self.fixed_steps);
        let _ = writeln!(out, "Subscribers:  {}", self.subscribers);
        let _ = writeln!(out, "Churned:      {}", self.churned);
        if self.expired > 0 || self.busy > 0 {
            let _ = writeln!(out, "Skipped:      {} expired, {} busy", self.expired, self.busy);
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<16} {:>10} {:>12} {:>10} {:>8}",
            "Stage", "Dispatches", "Invocations", "Registered", "Issued"
        );
        for s in &self.stages {
            let _ = writeln!(
                out,
                "{:<16} {:>10} {:>12} {:>10} {:>8}",
                s.stage.name(),
                s.dispatches,
                s.invocations,
                s.registered,
                s.issued
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Total Invocations: {}", self.total_invocations());
        out
    }
}

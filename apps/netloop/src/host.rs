//! # Host Loop
//!
//! The application side of the frame loop: a fixed-step clock, a
//! [`LoopDriver`] that repeats `FixedUpdate` as the clock demands, and a
//! [`Host`] that owns the loop, the workload and the running totals.
//!
//! Time is kept in integer nanoseconds; nothing here uses floating point.
//!
//! ```text
//! frame N:  Initialization  EarlyUpdate  FixedUpdate x k  PreUpdate  Update  PreLateUpdate  PostLateUpdate
//!                                        (k = 0..=max_fixed_steps)
//! ```

use crate::config::{RunConfig, ScenarioConfig};
use crate::report::RunReport;
use crate::workload::Workload;
use netloop_core::{FrameReport, LoopDriver, NetloopError, RunTotals, Stage, UpdateLoop};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

fn as_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

// =============================================================================
// FIXED-STEP CLOCK
// =============================================================================

/// Accumulates frame time and pays it out in whole fixed steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedStepClock {
    step_nanos: u64,
    max_steps: u32,
    accumulator: u64,
}

impl FixedStepClock {
    /// `step` of zero is treated as one nanosecond; `max_steps` of zero as one.
    pub fn new(step: Duration, max_steps: u32) -> Self {
        Self {
            step_nanos: as_nanos(step).max(1),
            max_steps: max_steps.max(1),
            accumulator: 0,
        }
    }

    /// Add `elapsed` and return how many fixed steps are due.
    ///
    /// At most `max_steps` are paid out. A backlog beyond that is dropped,
    /// keeping only the partial step.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator = self.accumulator.saturating_add(as_nanos(elapsed));
        let due = self.accumulator / self.step_nanos;
        let max = u64::from(self.max_steps);

        if due > max {
            tracing::debug!(due, max, "fixed-step backlog dropped");
            self.accumulator %= self.step_nanos;
            return self.max_steps;
        }

        self.accumulator -= due * self.step_nanos;
        due as u32
    }

    /// Time accumulated towards the next step.
    pub fn pending(&self) -> Duration {
        Duration::from_nanos(self.accumulator)
    }
}

// =============================================================================
// FIXED-STEP DRIVER
// =============================================================================

/// Runs every stage once per frame, except `FixedUpdate` which runs as many
/// times as the clock says (possibly zero).
#[derive(Debug, Clone)]
pub struct FixedStepDriver {
    clock: FixedStepClock,
    frame_time: Duration,
    fixed_steps: u64,
}

impl FixedStepDriver {
    pub fn new(frame_time: Duration, fixed_timestep: Duration, max_fixed_steps: u32) -> Self {
        Self {
            clock: FixedStepClock::new(fixed_timestep, max_fixed_steps),
            frame_time,
            fixed_steps: 0,
        }
    }

    pub fn from_run(run: &RunConfig) -> Self {
        Self::new(run.frame_time(), run.fixed_timestep(), run.max_fixed_steps)
    }

    /// Fixed steps run so far.
    pub fn fixed_steps(&self) -> u64 {
        self.fixed_steps
    }
}

impl LoopDriver for FixedStepDriver {
    fn drive_frame(&mut self, update_loop: &UpdateLoop) -> Result<FrameReport, NetloopError> {
        let steps = self.clock.advance(self.frame_time);
        let mut frame = FrameReport::new();

        for stage in Stage::ALL {
            let repeats = if stage == Stage::FixedUpdate { steps } else { 1 };
            for _ in 0..repeats {
                frame.push(update_loop.run_stage(stage)?);
            }
        }

        self.fixed_steps = self.fixed_steps.saturating_add(u64::from(steps));
        Ok(frame)
    }
}

// =============================================================================
// HOST
// =============================================================================

/// Owns one loop, its workload and the totals of a run.
#[derive(Debug)]
pub struct Host {
    update_loop: UpdateLoop,
    workload: Workload,
    driver: FixedStepDriver,
    totals: RunTotals,
    frame: u64,
    interrupted: bool,
}

impl Host {
    /// Build the loop and register the workload described by `scenario`.
    pub fn from_scenario(scenario: &ScenarioConfig) -> Result<Self, NetloopError> {
        scenario.validate()?;
        let update_loop = UpdateLoop::with_config(scenario.update_loop)?;
        let workload = Workload::build(&update_loop, &scenario.workload)?;

        Ok(Self {
            update_loop,
            workload,
            driver: FixedStepDriver::from_run(&scenario.run),
            totals: RunTotals::new(),
            frame: 0,
            interrupted: false,
        })
    }

    /// Drive one frame and apply workload churn.
    pub fn step(&mut self) -> Result<FrameReport, NetloopError> {
        self.frame = self.frame.saturating_add(1);
        self.workload.begin_frame(self.frame);

        let report = self.driver.drive_frame(&self.update_loop)?;
        self.totals.record(&report);
        tracing::trace!(
            frame = self.frame,
            invoked = report.total_invoked(),
            "frame driven"
        );

        let _ = self.workload.end_frame(self.frame)?;
        Ok(report)
    }

    /// Drive `frames` frames back to back.
    pub fn run(&mut self, frames: u64) -> Result<(), NetloopError> {
        for _ in 0..frames {
            let _ = self.step()?;
        }
        tracing::info!(frames = self.frame, "run complete");
        Ok(())
    }

    /// Drive `frames` frames, one per `period`, stopping early on Ctrl+C.
    ///
    /// Late ticks are skipped rather than bunched up.
    pub async fn run_paced(&mut self, frames: u64, period: Duration) -> Result<(), NetloopError> {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        tracing::info!(frames, period_us = period.as_micros() as u64, "paced run started");

        for _ in 0..frames {
            tokio::select! {
                result = &mut ctrl_c => {
                    result.map_err(|e| NetloopError::IoError(format!("Signal error: {}", e)))?;
                    tracing::info!(frames = self.frame, "interrupted");
                    self.interrupted = true;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let _ = self.step()?;
                }
            }
        }

        tracing::info!(frames = self.frame, "paced run complete");
        Ok(())
    }

    pub fn update_loop(&self) -> &UpdateLoop {
        &self.update_loop
    }

    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport::collect(
            &self.update_loop,
            &self.workload,
            &self.totals,
            self.driver.fixed_steps(),
            self.interrupted,
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Pattern, WorkloadConfig};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn clock_pays_whole_steps() {
        let mut clock = FixedStepClock::new(ms(20), 4);
        let steps: Vec<u32> = (0..5).map(|_| clock.advance(ms(16))).collect();

        assert_eq!(steps, vec![0, 1, 1, 1, 1]);
        assert_eq!(clock.pending(), Duration::ZERO);
    }

    #[test]
    fn clock_clamps_and_drops_backlog() {
        let mut clock = FixedStepClock::new(ms(10), 3);

        assert_eq!(clock.advance(ms(125)), 3);
        assert_eq!(clock.pending(), ms(5));
        assert_eq!(clock.advance(ms(5)), 1);
    }

    #[test]
    fn driver_repeats_fixed_update_only() {
        let update_loop = UpdateLoop::new();
        let mut driver = FixedStepDriver::new(ms(50), ms(20), 4);

        let frame = driver.drive_frame(&update_loop).expect("frame");
        assert_eq!(frame.runs(Stage::FixedUpdate), 2);
        assert_eq!(frame.runs(Stage::Update), 1);
        assert_eq!(frame.dispatches.len(), 8);

        let frame = driver.drive_frame(&update_loop).expect("frame");
        assert_eq!(frame.runs(Stage::FixedUpdate), 3);
        assert_eq!(driver.fixed_steps(), 5);
    }

    #[test]
    fn slow_step_can_skip_fixed_update() {
        let update_loop = UpdateLoop::new();
        let mut driver = FixedStepDriver::new(ms(5), ms(20), 4);

        let frame = driver.drive_frame(&update_loop).expect("frame");
        assert_eq!(frame.runs(Stage::FixedUpdate), 0);
        let order: Vec<Stage> = frame.stage_sequence().collect();
        assert_eq!(
            order,
            vec![
                Stage::Initialization,
                Stage::EarlyUpdate,
                Stage::PreUpdate,
                Stage::Update,
                Stage::PreLateUpdate,
                Stage::PostLateUpdate,
            ]
        );
    }

    #[test]
    fn host_run_totals_match_tallies() {
        let scenario = ScenarioConfig {
            workload: WorkloadConfig {
                subscribers: 10,
                pattern: Pattern::Cycle,
                churn_every: 3,
                ..WorkloadConfig::default()
            },
            ..ScenarioConfig::default()
        };
        let mut host = Host::from_scenario(&scenario).expect("host");
        host.run(16).expect("run");

        let report = host.report();
        assert_eq!(report.frames, 16);
        assert_eq!(report.fixed_steps, 12);
        assert!(report.is_balanced());
        assert_eq!(host.totals().dispatches_for(Stage::FixedUpdate), 12);
        assert!(host.update_loop().is_consistent());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn paced_run_drives_every_frame() {
        let mut host = Host::from_scenario(&ScenarioConfig::default()).expect("host");
        host.run_paced(4, ms(10)).await.expect("paced");

        let report = host.report();
        assert_eq!(report.frames, 4);
        assert!(!report.interrupted);
    }
}

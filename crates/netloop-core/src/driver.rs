//! # Loop Drivers
//!
//! The contract between a host frame loop and the dispatcher.
//!
//! A host calls `run_stage(S)` at its own points P1..Pn, in [`Stage::ALL`]
//! order, once per frame (fixed-rate stages may repeat). How those points are
//! spliced into the host's native loop is the host's business; the core only
//! needs something that implements [`LoopDriver`].

use crate::report::{FrameReport, RunTotals};
use crate::{NetloopError, UpdateLoop};

/// Drives one frame of an [`UpdateLoop`].
pub trait LoopDriver {
    /// Dispatch the stages of one frame and report what ran.
    fn drive_frame(&mut self, update_loop: &UpdateLoop) -> Result<FrameReport, NetloopError>;
}

/// The simplest driver: every stage exactly once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OncePerFrame {
    frames: u64,
}

impl OncePerFrame {
    /// Create a new driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames driven so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl LoopDriver for OncePerFrame {
    fn drive_frame(&mut self, update_loop: &UpdateLoop) -> Result<FrameReport, NetloopError> {
        let frame = update_loop.run_frame()?;
        self.frames = self.frames.saturating_add(1);
        Ok(frame)
    }
}

/// Drive `frames` frames back to back and fold them into totals.
pub fn drive_frames<D>(
    driver: &mut D,
    update_loop: &UpdateLoop,
    frames: u64,
) -> Result<RunTotals, NetloopError>
where
    D: LoopDriver + ?Sized,
{
    let mut totals = RunTotals::new();
    for _ in 0..frames {
        let frame = driver.drive_frame(update_loop)?;
        totals.record(&frame);
    }
    Ok(totals)
}

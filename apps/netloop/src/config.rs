//! # Scenario Configuration
//!
//! A scenario file describes one host run: loop tunables, frame timing and
//! the synthetic subscriber workload. Every section and field is optional.
//!
//! ```toml
//! [loop]
//! initial_capacity = 64
//! id_limit = 4294967295
//!
//! [run]
//! frames = 16
//! frame_time_ms = 16
//! fixed_timestep_ms = 20
//! max_fixed_steps = 4
//! target_fps = 60
//!
//! [workload]
//! subscribers = 10
//! pattern = "cycle"
//! stages = ["EarlyUpdate", "PreLateUpdate"]
//! churn_every = 0
//! ```

use clap::ValueEnum;
use netloop_core::{LoopConfig, NetloopError, Stage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum scenario file size (1 MB).
const MAX_SCENARIO_FILE_SIZE: u64 = 1024 * 1024;

/// Maximum number of synthetic subscribers.
pub const MAX_SUBSCRIBERS: usize = 100_000;

/// Maximum fixed steps allowed in one frame.
pub const MAX_FIXED_STEPS_CAP: u32 = 64;

/// Highest pacing rate accepted for `--paced` runs.
pub const MAX_TARGET_FPS: u32 = 1000;

// =============================================================================
// SECTIONS
// =============================================================================

/// Frame timing for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Frames to drive.
    pub frames: u64,
    /// Simulated wall time per frame, fed to the fixed-step accumulator.
    pub frame_time_ms: u64,
    /// Length of one fixed step.
    pub fixed_timestep_ms: u64,
    /// Upper bound on fixed steps per frame.
    pub max_fixed_steps: u32,
    /// Real-time frame rate for paced runs.
    pub target_fps: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: 16,
            frame_time_ms: 16,
            fixed_timestep_ms: 20,
            max_fixed_steps: 4,
            target_fps: 60,
        }
    }
}

impl RunConfig {
    pub fn frame_time(&self) -> Duration {
        Duration::from_millis(self.frame_time_ms)
    }

    pub fn fixed_timestep(&self) -> Duration {
        Duration::from_millis(self.fixed_timestep_ms)
    }

    /// Wall-clock period between paced frames.
    pub fn pacing_period(&self) -> Duration {
        let fps = u64::from(self.target_fps.max(1));
        Duration::from_nanos(1_000_000_000 / fps)
    }
}

/// How synthetic subscribers pick their stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    /// Five registration shapes, assigned by subscriber index modulo 5.
    #[default]
    Cycle,
    /// Every subscriber on every stage.
    All,
    /// Every subscriber on the default stage only.
    Default,
    /// Every subscriber on the stages listed in `workload.stages`.
    Stages,
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Pattern::Cycle => "cycle",
            Pattern::All => "all",
            Pattern::Default => "default",
            Pattern::Stages => "stages",
        };
        f.write_str(name)
    }
}

/// The synthetic subscriber population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkloadConfig {
    pub subscribers: usize,
    pub pattern: Pattern,
    /// Stages used by [`Pattern::Stages`].
    pub stages: Vec<Stage>,
    /// Every N frames, release and re-register every other subscriber. 0 disables churn.
    pub churn_every: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            subscribers: 10,
            pattern: Pattern::Cycle,
            stages: Vec::new(),
            churn_every: 0,
        }
    }
}

// =============================================================================
// SCENARIO
// =============================================================================

/// A complete scenario file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(rename = "loop")]
    pub update_loop: LoopConfig,
    pub run: RunConfig,
    pub workload: WorkloadConfig,
}

impl ScenarioConfig {
    /// Parse and validate a scenario from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, NetloopError> {
        let scenario: ScenarioConfig = toml::from_str(text)
            .map_err(|e| NetloopError::ConfigError(format!("Invalid scenario: {}", e)))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self, NetloopError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            NetloopError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(NetloopError::IoError(format!(
                "Path '{}' is not a regular file",
                path.display()
            )));
        }
        if metadata.len() > MAX_SCENARIO_FILE_SIZE {
            return Err(NetloopError::IoError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_SCENARIO_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            NetloopError::IoError(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        let scenario = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "scenario loaded");
        Ok(scenario)
    }

    /// Check every section; the first problem wins.
    pub fn validate(&self) -> Result<(), NetloopError> {
        self.update_loop.validate()?;

        let run = &self.run;
        if run.fixed_timestep_ms == 0 {
            return Err(NetloopError::InvalidConfig(
                "run.fixed_timestep_ms must be at least 1".to_string(),
            ));
        }
        if run.max_fixed_steps == 0 || run.max_fixed_steps > MAX_FIXED_STEPS_CAP {
            return Err(NetloopError::InvalidConfig(format!(
                "run.max_fixed_steps must be between 1 and {}",
                MAX_FIXED_STEPS_CAP
            )));
        }
        if run.target_fps == 0 || run.target_fps > MAX_TARGET_FPS {
            return Err(NetloopError::InvalidConfig(format!(
                "run.target_fps must be between 1 and {}",
                MAX_TARGET_FPS
            )));
        }

        let workload = &self.workload;
        if workload.subscribers > MAX_SUBSCRIBERS {
            return Err(NetloopError::InvalidConfig(format!(
                "workload.subscribers {} exceeds maximum allowed {}",
                workload.subscribers, MAX_SUBSCRIBERS
            )));
        }
        if workload.pattern == Pattern::Stages && workload.stages.is_empty() {
            return Err(NetloopError::InvalidConfig(
                "workload.pattern = \"stages\" needs a non-empty workload.stages".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

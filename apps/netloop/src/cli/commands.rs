//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{Pattern, ScenarioConfig};
use crate::host::Host;
use netloop_core::{NetloopError, Stage};
use serde::Serialize;
use std::path::Path;

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// STAGES COMMAND
// =============================================================================

/// Show the stage order.
pub fn cmd_stages(json_mode: bool) -> Result<(), NetloopError> {
    if json_mode {
        let stages: Vec<_> = Stage::ALL
            .iter()
            .map(|stage| {
                serde_json::json!({
                    "index": stage.index(),
                    "name": stage.name(),
                    "default": *stage == Stage::default(),
                })
            })
            .collect();
        print_json(&serde_json::json!({ "stages": stages }));
        return Ok(());
    }

    println!("netloop Stage Order");
    println!("===================");
    for stage in Stage::ALL {
        let marker = if stage == Stage::default() { "  (default)" } else { "" };
        println!("  {}  {}{}", stage.index(), stage.name(), marker);
    }

    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Command-line values that replace scenario file values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub frames: Option<u64>,
    pub subscribers: Option<usize>,
    pub pattern: Option<Pattern>,
}

impl RunOverrides {
    pub fn apply(&self, scenario: &mut ScenarioConfig) {
        if let Some(frames) = self.frames {
            scenario.run.frames = frames;
        }
        if let Some(subscribers) = self.subscribers {
            scenario.workload.subscribers = subscribers;
        }
        if let Some(pattern) = self.pattern {
            scenario.workload.pattern = pattern;
        }
    }
}

/// Resolve the scenario for `run`: file (or defaults), then overrides.
pub fn resolve_scenario(
    config: Option<&Path>,
    overrides: RunOverrides,
) -> Result<ScenarioConfig, NetloopError> {
    let mut scenario = match config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    overrides.apply(&mut scenario);
    scenario.validate()?;
    Ok(scenario)
}

/// Drive a workload and print the run report.
pub async fn cmd_run(
    config: Option<&Path>,
    overrides: RunOverrides,
    paced: bool,
    json_mode: bool,
    verbose: bool,
) -> Result<(), NetloopError> {
    let scenario = resolve_scenario(config, overrides)?;
    if verbose && !json_mode {
        print_scenario(&scenario);
        println!();
    }

    let mut host = Host::from_scenario(&scenario)?;
    if paced {
        host.run_paced(scenario.run.frames, scenario.run.pacing_period())
            .await?;
    } else {
        host.run(scenario.run.frames)?;
    }

    let report = host.report();
    if !report.is_balanced() {
        tracing::warn!("dispatcher and tally invocation counts disagree");
    }

    if json_mode {
        print_json(&report);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate a scenario file and print the resolved configuration.
pub fn cmd_check(path: &Path, json_mode: bool) -> Result<(), NetloopError> {
    let scenario = ScenarioConfig::load(path)?;

    if json_mode {
        print_json(&serde_json::json!({
            "valid": true,
            "path": path.to_string_lossy(),
            "scenario": scenario,
        }));
        return Ok(());
    }

    println!("Scenario OK: {}", path.display());
    println!();
    print_scenario(&scenario);
    Ok(())
}

fn print_scenario(scenario: &ScenarioConfig) {
    let stages: Vec<&str> = scenario.workload.stages.iter().map(Stage::name).collect();

    println!("Loop:");
    println!("  Initial Capacity: {}", scenario.update_loop.initial_capacity);
    println!("  Id Limit:         {}", scenario.update_loop.id_limit);
    println!("Run:");
    println!("  Frames:           {}", scenario.run.frames);
    println!("  Frame Time:       {} ms", scenario.run.frame_time_ms);
    println!("  Fixed Timestep:   {} ms", scenario.run.fixed_timestep_ms);
    println!("  Max Fixed Steps:  {}", scenario.run.max_fixed_steps);
    println!("  Target FPS:       {}", scenario.run.target_fps);
    println!("Workload:");
    println!("  Subscribers:      {}", scenario.workload.subscribers);
    println!("  Pattern:          {}", scenario.workload.pattern);
    if !stages.is_empty() {
        println!("  Stages:           {}", stages.join(", "));
    }
    println!("  Churn Every:      {}", scenario.workload.churn_every);
}

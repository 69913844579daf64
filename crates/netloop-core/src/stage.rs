//! # Update Stages
//!
//! The fixed, ordered set of phases a host loop runs once per frame.
//!
//! ## Stage Order
//!
//! | Index | Stage | Runs |
//! |-------|-------|------|
//! | 0 | Initialization | Start of the frame, before any input is read |
//! | 1 | EarlyUpdate | After platform events, before delayed startup work |
//! | 2 | FixedUpdate | Before fixed-rate physics steps (zero or more times per frame) |
//! | 3 | PreUpdate | Before physics results are applied |
//! | 4 | Update | Before per-object update scripts |
//! | 5 | PreLateUpdate | Before late update scripts |
//! | 6 | PostLateUpdate | After the frame has been submitted |
//!
//! The registry does not care *why* the host orders its phases this way. It
//! only relies on the driver calling each stage in this sequence.
//!
//! "Not currently dispatching" is represented as `None` in an `Option<Stage>`.

use crate::NetloopError;
use crate::primitives::STAGE_COUNT;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// STAGE ENUM
// =============================================================================

/// A named phase of the host loop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Stage {
    Initialization,
    EarlyUpdate,
    FixedUpdate,
    PreUpdate,
    /// Default target of [`crate::UpdateHandle::register_default`].
    #[default]
    Update,
    PreLateUpdate,
    PostLateUpdate,
}

impl Stage {
    /// Every stage, in host-loop order.
    pub const ALL: [Stage; STAGE_COUNT] = [
        Stage::Initialization,
        Stage::EarlyUpdate,
        Stage::FixedUpdate,
        Stage::PreUpdate,
        Stage::Update,
        Stage::PreLateUpdate,
        Stage::PostLateUpdate,
    ];

    /// Dense position of this stage in [`Stage::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Stage::Initialization => 0,
            Stage::EarlyUpdate => 1,
            Stage::FixedUpdate => 2,
            Stage::PreUpdate => 3,
            Stage::Update => 4,
            Stage::PreLateUpdate => 5,
            Stage::PostLateUpdate => 6,
        }
    }

    /// Inverse of [`Stage::index`].
    #[must_use]
    pub fn from_index(index: usize) -> Option<Stage> {
        Self::ALL.get(index).copied()
    }

    /// Get the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Initialization => "Initialization",
            Stage::EarlyUpdate => "EarlyUpdate",
            Stage::FixedUpdate => "FixedUpdate",
            Stage::PreUpdate => "PreUpdate",
            Stage::Update => "Update",
            Stage::PreLateUpdate => "PreLateUpdate",
            Stage::PostLateUpdate => "PostLateUpdate",
        }
    }

    /// Get the next stage within the same frame, if any.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        Self::from_index(self.index().saturating_add(1))
    }

    /// Get the previous stage within the same frame, if any.
    #[must_use]
    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Check if this is the first stage of a frame.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.previous().is_none()
    }

    /// Check if this is the last stage of a frame.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `EarlyUpdate`, `earlyupdate`, `early_update` and `early-update`.
impl FromStr for Stage {
    type Err = NetloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Self::ALL
            .into_iter()
            .find(|stage| stage.name().eq_ignore_ascii_case(&folded))
            .ok_or_else(|| NetloopError::UnknownStage(s.to_string()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ordering_matches_host_loop() {
        assert!(Stage::Initialization < Stage::EarlyUpdate);
        assert!(Stage::EarlyUpdate < Stage::FixedUpdate);
        assert!(Stage::FixedUpdate < Stage::PreUpdate);
        assert!(Stage::PreUpdate < Stage::Update);
        assert!(Stage::Update < Stage::PreLateUpdate);
        assert!(Stage::PreLateUpdate < Stage::PostLateUpdate);
    }

    #[test]
    fn index_round_trips_through_all() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(Stage::from_index(i), Some(*stage));
        }
        assert_eq!(Stage::from_index(STAGE_COUNT), None);
    }

    #[test]
    fn default_stage_is_update() {
        assert_eq!(Stage::default(), Stage::Update);
    }

    #[test]
    fn next_and_previous_walk_the_frame() {
        assert_eq!(Stage::Initialization.previous(), None);
        assert_eq!(Stage::Initialization.next(), Some(Stage::EarlyUpdate));
        assert_eq!(Stage::PostLateUpdate.next(), None);
        assert_eq!(Stage::PostLateUpdate.previous(), Some(Stage::PreLateUpdate));
        assert!(Stage::Initialization.is_first());
        assert!(Stage::PostLateUpdate.is_last());
        assert!(!Stage::Update.is_first());
    }

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!("EarlyUpdate".parse::<Stage>().ok(), Some(Stage::EarlyUpdate));
        assert_eq!("early_update".parse::<Stage>().ok(), Some(Stage::EarlyUpdate));
        assert_eq!("pre-late-update".parse::<Stage>().ok(), Some(Stage::PreLateUpdate));
        assert_eq!(" update ".parse::<Stage>().ok(), Some(Stage::Update));
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let result = "LateUpdate".parse::<Stage>();
        assert!(matches!(result, Err(NetloopError::UnknownStage(name)) if name == "LateUpdate"));
    }

    #[test]
    fn stage_display() {
        assert_eq!(format!("{}", Stage::FixedUpdate), "FixedUpdate");
    }
}

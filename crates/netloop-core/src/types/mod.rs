//! # Core Type Definitions
//!
//! This module contains the shared types of the netloop dispatcher:
//! - Identifiers (`SubscriptionId`, `HandleId`)
//! - The subscriber capability (`UpdateSystem`)
//! - Operation outcomes (`Registration`, `Unregistration`, `Removal`)
//! - Error types (`NetloopError`)
//!
//! ## Outcomes vs. Errors
//!
//! Registering an already active handle or unregistering an inactive one are
//! expected caller patterns. They are reported as outcome variants, never as
//! errors. Only conditions that make the loop unusable are `NetloopError`s.

use crate::Stage;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identity of one registration within one stage.
///
/// Issued monotonically from 1 by the stage registry and never reused.
/// Zero is not representable, so `Option<SubscriptionId>` is the
/// "inactive" slot of a handle at no extra cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(NonZeroU32);

impl SubscriptionId {
    /// Wrap a raw identity. Returns `None` for 0.
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Get the raw identity value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a subscription handle within one update loop.
///
/// Stored on every registry entry as the owning handle reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandleId(pub u64);

// =============================================================================
// SUBSCRIBER CAPABILITY
// =============================================================================

/// Something that can be invoked once per stage occurrence.
///
/// The running stage is passed explicitly. Code that is not handed the stage
/// can still ask [`crate::current_stage`].
///
/// Any `FnMut(Stage)` closure is an `UpdateSystem`.
pub trait UpdateSystem {
    /// Run this subscriber's work for `stage`.
    fn network_update(&mut self, stage: Stage);
}

impl<F> UpdateSystem for F
where
    F: FnMut(Stage),
{
    fn network_update(&mut self, stage: Stage) {
        self(stage);
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of [`crate::UpdateHandle::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Registration {
    /// A new entry was appended to the stage registry.
    Registered(SubscriptionId),
    /// The handle was already active in that stage; nothing changed.
    AlreadyRegistered(SubscriptionId),
}

impl Registration {
    /// The identity the handle holds for the stage after the call.
    pub fn id(self) -> SubscriptionId {
        match self {
            Registration::Registered(id) | Registration::AlreadyRegistered(id) => id,
        }
    }

    /// Whether the call changed any state.
    pub fn is_new(self) -> bool {
        matches!(self, Registration::Registered(_))
    }
}

/// Result of [`crate::UpdateHandle::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Unregistration {
    /// The entry with this identity was removed.
    Unregistered(SubscriptionId),
    /// The handle was not active in that stage; nothing changed.
    NotRegistered,
}

impl Unregistration {
    /// Whether the call changed any state.
    pub fn is_removed(self) -> bool {
        matches!(self, Unregistration::Unregistered(_))
    }
}

/// Result of [`crate::StageRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Removal {
    /// The entry was the last one; the collection just shrank.
    Popped,
    /// The last entry was moved into the vacated position.
    Relocated {
        /// Identity of the entry that moved.
        moved: SubscriptionId,
        /// Its new position.
        to: usize,
    },
    /// No entry carried that identity.
    AlreadyInactive,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the netloop system.
///
/// - No silent failures
/// - Use `Result<T, NetloopError>` for fallible operations
/// - Library code never panics; all errors are recoverable by the caller
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NetloopError {
    /// The stage has issued every identity up to its limit.
    ///
    /// Almost always a leak of handles that are never released.
    #[error("Identity space exhausted for stage {stage} (limit {limit})")]
    IdentitySpaceExhausted { stage: Stage, limit: u32 },

    /// `run_stage` was called from inside a subscriber callback.
    #[error("Cannot run stage {requested} while {active} is dispatching")]
    DispatchInProgress { active: Stage, requested: Stage },

    /// A stage name did not match any known stage.
    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A host configuration file could not be parsed.
    ///
    /// Never raised by this crate. Reserved for hosts that load loop
    /// settings from files, so they can report through one error type.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A host I/O operation failed.
    ///
    /// Never raised by this crate, which performs no I/O. Reserved for hosts.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_id_rejects_zero() {
        assert!(SubscriptionId::new(0).is_none());
        assert_eq!(SubscriptionId::new(7).map(SubscriptionId::get), Some(7));
    }

    #[test]
    fn option_subscription_id_is_free() {
        assert_eq!(
            std::mem::size_of::<Option<SubscriptionId>>(),
            std::mem::size_of::<u32>()
        );
    }

    #[test]
    fn closures_are_update_systems() {
        let mut seen = Vec::new();
        {
            let mut system = |stage: Stage| seen.push(stage);
            system.network_update(Stage::EarlyUpdate);
            system.network_update(Stage::Update);
        }
        assert_eq!(seen, vec![Stage::EarlyUpdate, Stage::Update]);
    }

    #[test]
    fn registration_accessors() {
        let id = SubscriptionId::new(3).expect("non-zero");
        assert!(Registration::Registered(id).is_new());
        assert!(!Registration::AlreadyRegistered(id).is_new());
        assert_eq!(Registration::AlreadyRegistered(id).id(), id);
        assert!(Unregistration::Unregistered(id).is_removed());
        assert!(!Unregistration::NotRegistered.is_removed());
    }

    #[test]
    fn error_messages_name_the_stage() {
        let err = NetloopError::IdentitySpaceExhausted {
            stage: Stage::FixedUpdate,
            limit: 9,
        };
        assert_eq!(
            err.to_string(),
            "Identity space exhausted for stage FixedUpdate (limit 9)"
        );
    }
}

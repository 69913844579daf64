//! # Innate Primitives
//!
//! Compile-time constants for the netloop CORE.
//!
//! The stage set is fixed at compile time; everything that scales with the
//! number of subscribers is bounded here.

/// Number of stages in one frame.
///
/// Every per-stage table in the crate is a `[_; STAGE_COUNT]` array.
pub const STAGE_COUNT: usize = 7;

/// Initial capacity reserved by each stage registry.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// Upper bound for [`crate::LoopConfig::initial_capacity`].
///
/// Capacity is only a hint; registries still grow past it. This limit keeps
/// a mistyped configuration from reserving gigabytes up front.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;

/// Highest subscription identity a stage may issue by default.
///
/// Identities start at 1 and are never reused, so this is also the lifetime
/// number of registrations one stage can accept.
pub const DEFAULT_ID_LIMIT: u32 = u32::MAX;

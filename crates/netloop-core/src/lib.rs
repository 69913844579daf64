//! # netloop-core
//!
//! The per-frame stage dispatcher for netloop - THE LOGIC.
//!
//! Independent subscribers attach to one or more named stages of a repeating
//! frame loop (`EarlyUpdate`, `FixedUpdate`, `PreLateUpdate`, ...). When the
//! host runs a stage, every subscriber attached to it is invoked once, in
//! registry order, with the stage passed as an argument.
//!
//! ## Pieces
//!
//! - [`Stage`]: the fixed, ordered stage set
//! - [`StageRegistry`]: per-stage dense subscriber list, O(1) add and swap-remove
//!   through a [`Ticket`] that tracks the entry's position
//! - [`UpdateLoop`]: owns the registries, dispatches stages and frames
//! - [`UpdateHandle`]: a subscriber's registrations, released on drop
//! - [`LoopDriver`]: what a host implements to call the stages
//!
//! ## Example
//!
//! ```
//! use netloop_core::{Stage, UpdateLoop};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let update_loop = UpdateLoop::new();
//! let ticks = Rc::new(RefCell::new(0u32));
//! let system = {
//!     let ticks = Rc::clone(&ticks);
//!     Rc::new(RefCell::new(move |_stage: Stage| *ticks.borrow_mut() += 1))
//! };
//!
//! let mut handle = update_loop.create_handle(&system);
//! handle.register_many(&[Stage::EarlyUpdate, Stage::PreLateUpdate]).unwrap();
//!
//! update_loop.run_frame().unwrap();
//! assert_eq!(*ticks.borrow(), 2);
//!
//! drop(handle);
//! update_loop.run_frame().unwrap();
//! assert_eq!(*ticks.borrow(), 2);
//! ```
//!
//! ## Architectural Constraints
//!
//! - Single-threaded: nothing here is `Send`; no locks
//! - Synchronous: callbacks run to completion inside `run_stage`
//! - No I/O, no persisted state (`ConfigError` and `IoError` exist for hosts)

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod driver;
pub mod handle;
pub mod primitives;
pub mod registry;
pub mod report;
pub mod stage;
pub mod types;
pub mod update_loop;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    HandleId, NetloopError, Registration, Removal, SubscriptionId, Unregistration, UpdateSystem,
};

// =============================================================================
// RE-EXPORTS: Dispatcher
// =============================================================================

pub use config::LoopConfig;
pub use driver::{LoopDriver, OncePerFrame, drive_frames};
pub use handle::UpdateHandle;
pub use registry::{StageRegistry, Ticket};
pub use report::{DispatchReport, FrameReport, RunTotals};
pub use stage::Stage;
pub use update_loop::{UpdateLoop, current_stage};

// =============================================================================
// RE-EXPORTS: Primitives
// =============================================================================

pub use primitives::STAGE_COUNT;

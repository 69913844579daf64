//! # Subscription Handle
//!
//! One handle per subscriber, spanning all stages.
//!
//! Per (handle, stage) pair:
//!
//! ```text
//! Inactive --register--> Active --unregister--> Inactive
//! Active   --register--> Active      (no-op, AlreadyRegistered)
//! Inactive --unregister--> Inactive  (no-op, NotRegistered)
//! drop: every Active pair --> Inactive
//! ```

use crate::primitives::STAGE_COUNT;
use crate::registry::{SystemRef, Ticket};
use crate::{
    HandleId, NetloopError, Registration, Removal, Stage, SubscriptionId, UpdateLoop,
    Unregistration,
};

/// A subscriber's registrations across every stage of one [`UpdateLoop`].
///
/// Dropping the handle unregisters it from every stage it is still active in.
#[derive(Debug)]
pub struct UpdateHandle {
    update_loop: UpdateLoop,
    system: SystemRef,
    handle_id: HandleId,
    tickets: [Option<Ticket>; STAGE_COUNT],
}

impl UpdateHandle {
    pub(crate) fn new(update_loop: UpdateLoop, system: SystemRef, handle_id: HandleId) -> Self {
        Self {
            update_loop,
            system,
            handle_id,
            tickets: Default::default(),
        }
    }

    /// Subscribe to `stage`. A no-op if already subscribed.
    pub fn register(&mut self, stage: Stage) -> Result<Registration, NetloopError> {
        if let Some(ticket) = &self.tickets[stage.index()] {
            return Ok(Registration::AlreadyRegistered(ticket.id()));
        }

        let ticket = self
            .update_loop
            .registry(stage)
            .borrow_mut()
            .add(self.system.clone(), self.handle_id)?;
        let id = ticket.id();
        self.tickets[stage.index()] = Some(ticket);

        tracing::debug!(handle = self.handle_id.0, %stage, id = id.get(), "registered");
        Ok(Registration::Registered(id))
    }

    /// Subscribe to [`Stage::default`].
    pub fn register_default(&mut self) -> Result<Registration, NetloopError> {
        self.register(Stage::default())
    }

    /// Unsubscribe from `stage`. A no-op if not subscribed.
    pub fn unregister(&mut self, stage: Stage) -> Unregistration {
        let Some(ticket) = self.tickets[stage.index()].take() else {
            return Unregistration::NotRegistered;
        };
        let id = ticket.id();

        let removal = self.update_loop.registry(stage).borrow_mut().remove(&ticket);
        if removal == Removal::AlreadyInactive {
            tracing::warn!(
                handle = self.handle_id.0,
                %stage,
                id = id.get(),
                "handle held an identity its registry did not know"
            );
        }

        tracing::debug!(handle = self.handle_id.0, %stage, id = id.get(), "unregistered");
        Unregistration::Unregistered(id)
    }

    /// Subscribe to every stage, in stage order.
    ///
    /// Returns how many stages were newly registered. Stops at the first
    /// exhausted stage; stages registered before it stay registered.
    pub fn register_all(&mut self) -> Result<usize, NetloopError> {
        self.register_many(&Stage::ALL)
    }

    /// Subscribe to each of `stages`, in the order given.
    pub fn register_many(&mut self, stages: &[Stage]) -> Result<usize, NetloopError> {
        let mut added = 0;
        for stage in stages {
            if self.register(*stage)?.is_new() {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Unsubscribe from every stage, in stage order.
    ///
    /// Returns how many stages were actually removed.
    pub fn unregister_all(&mut self) -> usize {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.unregister(*stage).is_removed())
            .count()
    }

    /// Check if this handle is active in `stage`.
    #[must_use]
    pub fn is_registered(&self, stage: Stage) -> bool {
        self.tickets[stage.index()].is_some()
    }

    /// Current dispatch position in `stage`, if active.
    #[must_use]
    pub fn position(&self, stage: Stage) -> Option<usize> {
        self.tickets[stage.index()]
            .as_ref()
            .and_then(Ticket::position)
    }

    /// Identity held for `stage`, if active.
    #[must_use]
    pub fn id(&self, stage: Stage) -> Option<SubscriptionId> {
        self.tickets[stage.index()].as_ref().map(Ticket::id)
    }

    /// Stages this handle is active in, in stage order.
    #[must_use]
    pub fn active_stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| self.is_registered(*stage))
            .collect()
    }

    /// Number of stages this handle is active in.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tickets.iter().flatten().count()
    }

    /// Identity of this handle within its loop.
    #[must_use]
    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// The loop this handle registers with.
    #[must_use]
    pub fn update_loop(&self) -> &UpdateLoop {
        &self.update_loop
    }
}

impl Drop for UpdateHandle {
    fn drop(&mut self) {
        let released = self.unregister_all();
        if released > 0 {
            tracing::trace!(handle = self.handle_id.0, released, "handle released");
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # Stage Registry
//!
//! The authoritative set of active subscribers for one stage.
//!
//! ## Layout
//!
//! - `entries`: dense `Vec`, dispatched front to back
//! - each entry shares a position cell with the [`Ticket`] returned by `add`
//! - `issued`: last identity handed out (0 = none yet)
//!
//! Removal is a `swap_remove`: the last entry moves into the vacated slot and
//! its position cell is rewritten in the same call. Both `add` and `remove`
//! are O(1); there is no identity-keyed index to maintain. Positions never
//! stay sorted by identity, and nothing in this module assumes they do.
//!
//! Identities grow monotonically and are never reused. When the next identity
//! would pass `id_limit` the registry refuses further additions instead of
//! wrapping.

use crate::config::LoopConfig;
use crate::{HandleId, NetloopError, Removal, Stage, SubscriptionId, UpdateSystem};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Weak reference to a subscriber, as stored in a registry entry.
pub type SystemRef = Weak<RefCell<dyn UpdateSystem>>;

/// Position value of a ticket whose entry has been removed.
const DETACHED: usize = usize::MAX;

/// One active registration.
#[derive(Debug, Clone)]
struct Entry {
    id: SubscriptionId,
    system: SystemRef,
    owner: HandleId,
    position: Rc<Cell<usize>>,
}

/// Receipt for one registration, kept by whoever registered.
///
/// Shares its position cell with the registry entry, so the registry can find
/// the entry without a lookup and keep the cell current when the entry moves.
#[derive(Debug, Clone)]
pub struct Ticket {
    id: SubscriptionId,
    position: Rc<Cell<usize>>,
}

impl Ticket {
    /// Identity of the registration.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Current dispatch position, or `None` once removed.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        Some(self.position.get()).filter(|position| *position != DETACHED)
    }
}

/// Active subscribers and identity bookkeeping for a single stage.
#[derive(Debug)]
pub struct StageRegistry {
    stage: Stage,
    entries: Vec<Entry>,
    issued: u32,
    id_limit: u32,
}

impl StageRegistry {
    /// Create an empty registry with default settings.
    #[must_use]
    pub fn new(stage: Stage) -> Self {
        Self::with_config(stage, &LoopConfig::default())
    }

    /// Create an empty registry using the capacity and identity limit of `config`.
    ///
    /// `config` is assumed to be validated; an `id_limit` of 0 yields a
    /// registry that refuses every addition.
    #[must_use]
    pub fn with_config(stage: Stage, config: &LoopConfig) -> Self {
        Self {
            stage,
            entries: Vec::with_capacity(config.initial_capacity),
            issued: 0,
            id_limit: config.id_limit,
        }
    }

    /// Append a subscriber and return the ticket that removes it again.
    ///
    /// Fails only when the identity space of this stage is exhausted. The
    /// failure is sticky: every later call fails the same way.
    pub fn add(&mut self, system: SystemRef, owner: HandleId) -> Result<Ticket, NetloopError> {
        let next = self
            .issued
            .checked_add(1)
            .filter(|raw| *raw <= self.id_limit)
            .and_then(SubscriptionId::new);

        let Some(id) = next else {
            tracing::error!(
                stage = %self.stage,
                limit = self.id_limit,
                active = self.entries.len(),
                "identity space exhausted; handles are probably leaking"
            );
            return Err(NetloopError::IdentitySpaceExhausted {
                stage: self.stage,
                limit: self.id_limit,
            });
        };

        let position = Rc::new(Cell::new(self.entries.len()));
        self.entries.push(Entry {
            id,
            system,
            owner,
            position: Rc::clone(&position),
        });
        self.issued = id.get();

        tracing::trace!(
            stage = %self.stage,
            id = id.get(),
            position = position.get(),
            "entry added"
        );
        Ok(Ticket { id, position })
    }

    /// Remove the entry behind `ticket`, keeping the collection dense.
    ///
    /// A ticket that was already removed, or that belongs to another
    /// registry, yields [`Removal::AlreadyInactive`].
    pub fn remove(&mut self, ticket: &Ticket) -> Removal {
        let position = ticket.position.get();
        let owned = self
            .entries
            .get(position)
            .is_some_and(|entry| Rc::ptr_eq(&entry.position, &ticket.position));
        if !owned {
            return Removal::AlreadyInactive;
        }

        let removed = self.entries.swap_remove(position);
        removed.position.set(DETACHED);

        match self.entries.get(position) {
            Some(moved) => {
                moved.position.set(position);
                let moved = moved.id;
                tracing::trace!(
                    stage = %self.stage,
                    id = ticket.id.get(),
                    moved = moved.get(),
                    position,
                    "entry removed, last entry relocated"
                );
                Removal::Relocated { moved, to: position }
            }
            None => {
                tracing::trace!(
                    stage = %self.stage,
                    id = ticket.id.get(),
                    "entry removed from tail"
                );
                Removal::Popped
            }
        }
    }

    /// The subscriber at `position`, if the collection is still that long.
    ///
    /// Used by dispatch, which walks positions one at a time so that the
    /// registry is not borrowed while a callback runs.
    #[must_use]
    pub fn entry_at(&self, position: usize) -> Option<(SubscriptionId, SystemRef)> {
        self.entries
            .get(position)
            .map(|entry| (entry.id, entry.system.clone()))
    }

    /// The stage this registry serves.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Number of active entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no subscriber is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if `id` is currently active. Linear; meant for diagnostics.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.position_of(id).is_some()
    }

    /// Current dispatch position of `id`. Linear; holders of a [`Ticket`]
    /// should use [`Ticket::position`].
    #[must_use]
    pub fn position_of(&self, id: SubscriptionId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Active identities in dispatch order.
    pub fn ids(&self) -> impl Iterator<Item = SubscriptionId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    /// Owning handles in dispatch order.
    pub fn owners(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.entries.iter().map(|entry| entry.owner)
    }

    /// Highest identity issued so far (0 if none).
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// Highest identity this registry may issue.
    #[must_use]
    pub fn id_limit(&self) -> u32 {
        self.id_limit
    }

    /// Identities still available before exhaustion.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.id_limit.saturating_sub(self.issued)
    }

    /// Verify every entry's position cell against its actual position.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(position, entry)| entry.position.get() == position)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> Rc<RefCell<dyn UpdateSystem>> {
        Rc::new(RefCell::new(|_stage: Stage| {}))
    }

    fn id(raw: u32) -> SubscriptionId {
        SubscriptionId::new(raw).expect("non-zero")
    }

    /// Registry with `count` entries; `tickets[i]` carries identity `i + 1`.
    fn filled(
        count: u64,
    ) -> (StageRegistry, Vec<Ticket>, Vec<Rc<RefCell<dyn UpdateSystem>>>) {
        let mut registry = StageRegistry::new(Stage::Update);
        let systems: Vec<_> = (0..count).map(|_| system()).collect();
        let tickets = systems
            .iter()
            .enumerate()
            .map(|(owner, s)| {
                registry
                    .add(Rc::downgrade(s), HandleId(owner as u64 + 1))
                    .expect("add")
            })
            .collect();
        (registry, tickets, systems)
    }

    #[test]
    fn identities_start_at_one_and_increase() {
        let (registry, tickets, _systems) = filled(3);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![id(1), id(2), id(3)]);
        assert_eq!(tickets[2].id(), id(3));
        assert_eq!(registry.issued(), 3);
    }

    #[test]
    fn identities_are_not_reused_after_removal() {
        let (mut registry, tickets, systems) = filled(2);
        assert_eq!(registry.remove(&tickets[1]), Removal::Popped);

        let next = registry
            .add(Rc::downgrade(&systems[1]), HandleId(9))
            .expect("add");
        assert_eq!(next.id(), id(3));
    }

    #[test]
    fn removing_tail_pops() {
        let (mut registry, tickets, _systems) = filled(3);
        assert_eq!(registry.remove(&tickets[2]), Removal::Popped);
        assert_eq!(registry.len(), 2);
        assert_eq!(tickets[2].position(), None);
        assert!(registry.is_consistent());
    }

    #[test]
    fn removing_middle_relocates_last_entry() {
        let (mut registry, tickets, _systems) = filled(5);

        let removal = registry.remove(&tickets[1]);
        assert_eq!(removal, Removal::Relocated { moved: id(5), to: 1 });
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec![id(1), id(5), id(3), id(4)]
        );
        assert_eq!(tickets[4].position(), Some(1));
        assert_eq!(registry.position_of(id(5)), Some(1));
        assert!(registry.is_consistent());
    }

    #[test]
    fn relocated_entry_can_still_be_removed() {
        // Positions are no longer sorted by identity after the first swap.
        let (mut registry, tickets, _systems) = filled(5);
        let _ = registry.remove(&tickets[1]);

        assert_eq!(registry.remove(&tickets[4]), Removal::Relocated { moved: id(4), to: 1 });
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![id(1), id(4), id(3)]);
        assert_eq!(tickets[3].position(), Some(1));
        assert!(!registry.contains(id(5)));
        assert!(registry.is_consistent());
    }

    #[test]
    fn position_cells_track_every_relocation() {
        let (mut registry, tickets, _systems) = filled(8);
        for victim in [0, 6, 3, 7] {
            let _ = registry.remove(&tickets[victim]);
            assert!(registry.is_consistent());
        }

        for ticket in &tickets {
            assert_eq!(ticket.position(), registry.position_of(ticket.id()));
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn owners_follow_their_entries() {
        let (mut registry, tickets, _systems) = filled(3);
        let _ = registry.remove(&tickets[0]);
        assert_eq!(
            registry.owners().collect::<Vec<_>>(),
            vec![HandleId(3), HandleId(2)]
        );
    }

    #[test]
    fn removing_stale_or_foreign_ticket_is_noop() {
        let (mut registry, tickets, _systems) = filled(2);
        let (_other, foreign, _other_systems) = filled(2);

        assert_eq!(registry.remove(&foreign[0]), Removal::AlreadyInactive);
        assert_eq!(registry.remove(&tickets[0]), Removal::Relocated { moved: id(2), to: 0 });
        assert_eq!(registry.remove(&tickets[0]), Removal::AlreadyInactive);
        assert_eq!(registry.len(), 1);
        assert_eq!(tickets[1].position(), Some(0));
    }

    #[test]
    fn exhaustion_at_configured_limit_is_sticky() {
        let config = LoopConfig::default().with_id_limit(2);
        let mut registry = StageRegistry::with_config(Stage::FixedUpdate, &config);
        let s = system();

        let first = registry.add(Rc::downgrade(&s), HandleId(1)).expect("add");
        let second = registry.add(Rc::downgrade(&s), HandleId(2)).expect("add");
        assert_eq!((first.id(), second.id()), (id(1), id(2)));
        assert_eq!(registry.remaining(), 0);

        let expected = Err(NetloopError::IdentitySpaceExhausted {
            stage: Stage::FixedUpdate,
            limit: 2,
        });
        assert_eq!(registry.add(Rc::downgrade(&s), HandleId(3)).map(|t| t.id()), expected);

        // Freeing entries does not free identities.
        let _ = registry.remove(&first);
        assert_eq!(registry.add(Rc::downgrade(&s), HandleId(4)).map(|t| t.id()), expected);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn counter_never_wraps_to_zero() {
        let mut registry = StageRegistry::new(Stage::Update);
        registry.issued = u32::MAX - 1;
        let s = system();

        assert_eq!(
            registry.add(Rc::downgrade(&s), HandleId(1)).map(|t| t.id().get()),
            Ok(u32::MAX)
        );
        assert!(matches!(
            registry.add(Rc::downgrade(&s), HandleId(2)),
            Err(NetloopError::IdentitySpaceExhausted { .. })
        ));
        assert_eq!(registry.issued(), u32::MAX);
    }

    #[test]
    fn entry_at_stops_at_len() {
        let (registry, _tickets, systems) = filled(2);
        let (first, weak) = registry.entry_at(0).expect("entry");
        assert_eq!(first, id(1));
        assert!(weak.upgrade().is_some_and(|s| Rc::ptr_eq(&s, &systems[0])));
        assert!(registry.entry_at(2).is_none());
    }
}

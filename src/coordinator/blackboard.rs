//! Blackboard - shared per-shipment state
//!
//! The single source of truth for shipment status. The coordination loop
//! writes to it; the status server and anything else holding an
//! `Arc<Blackboard>` may read or write concurrently. Callers only ever get
//! copies: no reference into the map escapes this module.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::state::ShipmentState;

#[derive(Default)]
pub struct Blackboard {
    entries: DashMap<String, ShipmentState>,
    revision: AtomicU64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fresh(&self, shipment_id: &str) -> ShipmentState {
        let mut state = ShipmentState::new(shipment_id);
        state.revision = self.next_revision();
        debug!(shipment_id, "blackboard entry created");
        state
    }

    /// Return the entry for `shipment_id`, creating a default one if unknown.
    ///
    /// Creation happens under the shard lock, so concurrent callers for the
    /// same id all observe the one entry that won.
    pub fn get_or_create(&self, shipment_id: &str) -> ShipmentState {
        self.entries
            .entry(shipment_id.to_string())
            .or_insert_with(|| self.fresh(shipment_id))
            .value()
            .clone()
    }

    /// Apply `mutator` under exclusive access and return the new state.
    ///
    /// The mutator works on a copy that replaces the stored entry only once
    /// it returns. Unknown ids get a default entry first. The id and revision
    /// are owned by the blackboard and cannot be changed by the mutator.
    ///
    /// The mutator runs while the entry's shard is write-locked. It must not
    /// call back into this blackboard: a read of any key on the same shard
    /// deadlocks.
    pub fn update<F>(&self, shipment_id: &str, mutator: F) -> ShipmentState
    where
        F: FnOnce(&mut ShipmentState),
    {
        let mut entry = self
            .entries
            .entry(shipment_id.to_string())
            .or_insert_with(|| self.fresh(shipment_id));

        let mut next = entry.value().clone();
        mutator(&mut next);
        next.id = entry.value().id.clone();
        next.revision = self.next_revision();

        *entry.value_mut() = next.clone();
        next
    }

    /// Point-in-time copy of one entry
    pub fn snapshot(&self, shipment_id: &str) -> Option<ShipmentState> {
        self.entries.get(shipment_id).map(|e| e.value().clone())
    }

    /// Copies of every entry, ordered by shipment id
    pub fn snapshot_all(&self) -> Vec<ShipmentState> {
        let mut all: Vec<ShipmentState> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Seed entries loaded from durable storage. Live entries win.
    pub fn hydrate(&self, states: impl IntoIterator<Item = ShipmentState>) -> usize {
        let mut inserted = 0;
        for state in states {
            self.revision.fetch_max(state.revision, Ordering::SeqCst);
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.entries.entry(state.id.clone()) {
                slot.insert(state);
                inserted += 1;
            }
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::ShipmentStatus;
    use std::sync::Arc;

    #[test]
    fn test_get_or_create_defaults() {
        let bb = Blackboard::new();
        let state = bb.get_or_create("SHIP-1");

        assert_eq!(state.id, "SHIP-1");
        assert_eq!(state.status, ShipmentStatus::Normal);
        assert_eq!(bb.len(), 1);

        // Second call returns the same entry
        let again = bb.get_or_create("SHIP-1");
        assert_eq!(again, state);
        assert_eq!(bb.len(), 1);
    }

    #[test]
    fn test_update_creates_default_before_mutating() {
        let bb = Blackboard::new();
        let mut seen = None;

        let state = bb.update("SHIP-9", |s| {
            seen = Some((s.id.clone(), s.status));
            s.status = ShipmentStatus::AtRisk;
        });

        assert_eq!(seen, Some(("SHIP-9".to_string(), ShipmentStatus::Normal)));
        assert_eq!(state.status, ShipmentStatus::AtRisk);
        assert_eq!(bb.snapshot("SHIP-9").unwrap().status, ShipmentStatus::AtRisk);
    }

    #[test]
    fn test_mutator_cannot_change_id() {
        let bb = Blackboard::new();
        let state = bb.update("SHIP-1", |s| s.id = "SHIP-2".to_string());

        assert_eq!(state.id, "SHIP-1");
        assert!(bb.snapshot("SHIP-2").is_none());
    }

    #[test]
    fn test_revisions_increase_across_shipments() {
        let bb = Blackboard::new();
        let a = bb.update("A", |s| s.risk_score = 0.1);
        let b = bb.update("B", |s| s.risk_score = 0.2);
        let a2 = bb.update("A", |s| s.risk_score = 0.3);

        assert!(a.revision < b.revision);
        assert!(b.revision < a2.revision);
        assert_eq!(bb.snapshot("A").unwrap().risk_score, 0.3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let bb = Blackboard::new();
        bb.update("SHIP-1", |s| s.risk_score = 0.5);

        let mut copy = bb.snapshot("SHIP-1").unwrap();
        copy.risk_score = 0.99;

        assert_eq!(bb.snapshot("SHIP-1").unwrap().risk_score, 0.5);
        assert!(bb.snapshot("unknown").is_none());
    }

    #[test]
    fn test_hydrate_keeps_live_entries() {
        let bb = Blackboard::new();
        bb.update("LIVE", |s| s.risk_score = 0.9);

        let mut stored_live = ShipmentState::new("LIVE");
        stored_live.revision = 40;
        let mut stored_other = ShipmentState::new("OTHER");
        stored_other.revision = 41;

        assert_eq!(bb.hydrate(vec![stored_live, stored_other]), 1);
        assert_eq!(bb.snapshot("LIVE").unwrap().risk_score, 0.9);

        // Revisions continue past anything hydrated
        let next = bb.update("OTHER", |_| {});
        assert!(next.revision > 41);
    }

    #[test]
    fn test_concurrent_get_or_create_single_entry() {
        let bb = Arc::new(Blackboard::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let bb = bb.clone();
                std::thread::spawn(move || bb.get_or_create("SHARED"))
            })
            .collect();

        let results: Vec<ShipmentState> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(bb.len(), 1);
        let first = &results[0];
        assert!(results.iter().all(|s| s.revision == first.revision));
        assert!(results.iter().all(|s| s.last_updated == first.last_updated));
    }

    #[test]
    fn test_update_from_values_read_beforehand() {
        let bb = Blackboard::new();
        bb.update("A", |s| s.risk_score = 0.6);

        // Read first, then mutate with the copy
        let upstream = bb.snapshot("A").unwrap().risk_score;
        let b = bb.update("B", |s| s.risk_score = upstream);

        assert_eq!(b.risk_score, 0.6);
        assert_eq!(bb.snapshot("A").unwrap().risk_score, 0.6);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let bb = Arc::new(Blackboard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bb = bb.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        bb.update("COUNTER", |s| s.risk_score += 1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(bb.snapshot("COUNTER").unwrap().risk_score, 800.0);
    }
}

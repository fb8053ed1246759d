// 👥 Person Registry - tracked roster + observer bindings
//
// The roster is a view over the ledger's keys. Leaving the roster unbinds the
// person's observer; what happens to the ledger row is the orphan policy's call.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use crate::db::BalanceStore;
use crate::error::LedgerResult;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Display-side binding refreshed when a person's balance changes
pub trait Refreshable: Send + Sync {
    fn refresh(&self);
}

/// Receives a signal after each committed credit/debit
pub trait ChangeNotifier: Send + Sync {
    fn notify_changed(&self, person_id: &str);
}

/// What happens to a ledger row when its person leaves the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Keep the balance; re-adding the person rediscovers it
    #[default]
    Retain,

    /// Delete the ledger row
    Purge,
}

/// Membership delta produced by `set_roster`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl RosterChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// PERSON REGISTRY
// ============================================================================

pub struct PersonRegistry {
    roster: RwLock<Vec<String>>,
    observers: RwLock<HashMap<String, Arc<dyn Refreshable>>>,
    orphan_policy: OrphanPolicy,
}

impl PersonRegistry {
    pub fn new(orphan_policy: OrphanPolicy) -> Self {
        PersonRegistry {
            roster: RwLock::new(Vec::new()),
            observers: RwLock::new(HashMap::new()),
            orphan_policy,
        }
    }

    pub fn orphan_policy(&self) -> OrphanPolicy {
        self.orphan_policy
    }

    /// Replace the tracked set.
    ///
    /// Every member gets an account (create-if-absent, so existing balances are
    /// untouched). Departing members lose their observer binding. Duplicate ids
    /// collapse to their first occurrence.
    ///
    /// All ledger writes happen before the roster is swapped: on error the roster
    /// and bindings are unchanged, though accounts already ensured or purged stay so.
    pub fn set_roster(&self, store: &BalanceStore, person_ids: &[String]) -> LedgerResult<RosterChange> {
        let mut roster = self.roster.write().unwrap_or_else(PoisonError::into_inner);

        let mut seen = HashSet::new();
        let next: Vec<String> = person_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        for person_id in &next {
            store.ensure_account(person_id)?;
        }

        let change = RosterChange {
            added: next.iter().filter(|id| !roster.contains(*id)).cloned().collect(),
            removed: roster.iter().filter(|id| !next.contains(*id)).cloned().collect(),
        };

        if self.orphan_policy == OrphanPolicy::Purge {
            for person_id in &change.removed {
                store.delete_account(person_id)?;
            }
        }

        *roster = next;

        for person_id in &change.removed {
            self.unregister_observer(person_id);
        }

        if !change.is_empty() {
            info!(added = ?change.added, removed = ?change.removed, "Roster updated");
        }

        Ok(change)
    }

    pub fn roster(&self) -> Vec<String> {
        self.roster.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_tracked(&self, person_id: &str) -> bool {
        self.roster
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|id| id == person_id)
    }

    /// Ledger accounts whose person is no longer on the roster
    pub fn orphans(&self, store: &BalanceStore) -> LedgerResult<Vec<String>> {
        let roster = self.roster();
        Ok(store
            .list_accounts()?
            .into_iter()
            .map(|account| account.person_id)
            .filter(|id| !roster.contains(id))
            .collect())
    }

    /// Bind `observer` to `person_id`, returning the binding it replaced
    pub fn register_observer(
        &self,
        person_id: &str,
        observer: Arc<dyn Refreshable>,
    ) -> Option<Arc<dyn Refreshable>> {
        debug!(person_id, "Binding observer");
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(person_id.to_string(), observer)
    }

    pub fn unregister_observer(&self, person_id: &str) -> Option<Arc<dyn Refreshable>> {
        let removed = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(person_id);
        if removed.is_some() {
            debug!(person_id, "Unbound observer");
        }
        removed
    }

    pub fn is_bound(&self, person_id: &str) -> bool {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(person_id)
    }

    /// Refresh the bound observer synchronously. Unbound persons are a no-op.
    pub fn notify_changed(&self, person_id: &str) {
        // Clone out of the lock so an observer may rebind from inside refresh()
        let observer = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(person_id)
            .cloned();

        match observer {
            Some(observer) => {
                debug!(person_id, "Refreshing observer");
                observer.refresh();
            }
            None => debug!(person_id, "No observer bound, skipping refresh"),
        }
    }
}

impl Default for PersonRegistry {
    fn default() -> Self {
        Self::new(OrphanPolicy::default())
    }
}

impl ChangeNotifier for PersonRegistry {
    fn notify_changed(&self, person_id: &str) {
        PersonRegistry::notify_changed(self, person_id);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingObserver {
        refreshes: AtomicUsize,
    }

    impl Refreshable for CountingObserver {
        fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingObserver {
        fn count(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    fn setup(policy: OrphanPolicy) -> (TempDir, Arc<PersonRegistry>, BalanceStore) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(PersonRegistry::new(policy));
        let store = BalanceStore::open(dir.path().join("ledger.db")).with_notifier(registry.clone());
        store.initialize().unwrap();
        (dir, registry, store)
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_roster_creates_zero_accounts() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);

        let change = registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();

        assert_eq!(change.added, ids(&["alice", "bob"]));
        assert!(change.removed.is_empty());
        assert_eq!(store.list_accounts().unwrap().len(), 2);
        assert_eq!(store.get_balance("alice").unwrap(), 0.0);
        assert!(registry.is_tracked("bob"));
    }

    #[test]
    fn test_set_roster_is_idempotent() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);
        registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();
        store.credit("alice", 4.0).unwrap();

        let change = registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();

        assert!(change.is_empty());
        assert_eq!(store.list_accounts().unwrap().len(), 2);
        assert_eq!(store.get_balance("alice").unwrap(), 4.0);
    }

    #[test]
    fn test_set_roster_collapses_duplicates() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);

        registry.set_roster(&store, &ids(&["amy", "ben", "amy"])).unwrap();

        assert_eq!(registry.roster(), ids(&["amy", "ben"]));
    }

    #[test]
    fn test_removed_then_readded_keeps_balance() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);
        registry.set_roster(&store, &ids(&["alice"])).unwrap();
        store.credit("alice", 10.0).unwrap();
        assert_eq!(store.get_balance("alice").unwrap(), 10.0);

        registry.set_roster(&store, &[]).unwrap();
        assert_eq!(registry.orphans(&store).unwrap(), ids(&["alice"]));

        registry.set_roster(&store, &ids(&["alice"])).unwrap();

        assert_eq!(store.get_balance("alice").unwrap(), 10.0);
        assert!(registry.orphans(&store).unwrap().is_empty());
    }

    #[test]
    fn test_purge_policy_deletes_departed() {
        let (_dir, registry, store) = setup(OrphanPolicy::Purge);
        registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();
        store.credit("alice", 10.0).unwrap();

        let change = registry.set_roster(&store, &ids(&["bob"])).unwrap();

        assert_eq!(change.removed, ids(&["alice"]));
        assert!(store.get_account("alice").unwrap().is_none());
        assert!(registry.orphans(&store).unwrap().is_empty());
    }

    #[test]
    fn test_failed_purge_leaves_roster_unchanged() {
        let (_dir, registry, store) = setup(OrphanPolicy::Purge);
        registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();
        let observer = Arc::new(CountingObserver::default());
        registry.register_observer("alice", observer.clone());

        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER refuse_delete BEFORE DELETE ON accounts
             BEGIN SELECT RAISE(ABORT, 'delete refused'); END;",
        )
        .unwrap();
        drop(conn);

        let result = registry.set_roster(&store, &ids(&["bob"]));

        assert!(result.is_err());
        assert_eq!(registry.roster(), ids(&["alice", "bob"]));
        assert!(registry.is_bound("alice"));
        assert!(store.get_account("alice").unwrap().is_some());
    }

    #[test]
    fn test_roster_removal_unbinds_observer() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);
        registry.set_roster(&store, &ids(&["alice", "bob"])).unwrap();
        let observer = Arc::new(CountingObserver::default());
        registry.register_observer("alice", observer.clone());

        registry.set_roster(&store, &ids(&["bob"])).unwrap();
        store.credit("alice", 1.0).unwrap();

        assert!(!registry.is_bound("alice"));
        assert_eq!(observer.count(), 0);
    }

    #[test]
    fn test_credit_refreshes_bound_observer_once() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);
        registry.set_roster(&store, &ids(&["carol"])).unwrap();
        let observer = Arc::new(CountingObserver::default());
        registry.register_observer("carol", observer.clone());

        store.credit("carol", 2.0).unwrap();
        assert_eq!(observer.count(), 1);

        store.debit("carol", 1.0).unwrap();
        assert_eq!(observer.count(), 2);
    }

    #[test]
    fn test_rebind_replaces_previous_observer() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);
        let first = Arc::new(CountingObserver::default());
        let second = Arc::new(CountingObserver::default());

        assert!(registry.register_observer("dan", first.clone()).is_none());
        assert!(registry.register_observer("dan", second.clone()).is_some());
        store.credit("dan", 1.0).unwrap();

        assert_eq!(first.count(), 0);
        assert_eq!(second.count(), 1);
    }

    #[test]
    fn test_notify_without_observer_is_noop() {
        let (_dir, registry, store) = setup(OrphanPolicy::Retain);

        registry.notify_changed("ghost");
        store.credit("ghost", 1.0).unwrap();

        assert_eq!(store.get_balance("ghost").unwrap(), 1.0);
    }

    #[test]
    fn test_explicit_unregister() {
        let registry = PersonRegistry::default();
        let observer = Arc::new(CountingObserver::default());
        registry.register_observer("eve", observer.clone());

        assert!(registry.unregister_observer("eve").is_some());
        assert!(registry.unregister_observer("eve").is_none());
        registry.notify_changed("eve");

        assert_eq!(observer.count(), 0);
    }
}

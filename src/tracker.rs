// 🧾 Allowance Tracker - the owned store + registry pair
//
// Hosts construct one of these and pass it to whatever dispatches commands or
// renders balances. Nothing here is global.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::TrackerConfig;
use crate::db::BalanceStore;
use crate::error::LedgerResult;
use crate::registry::{PersonRegistry, Refreshable, RosterChange};
use crate::sensor::AllowanceSensor;

// ============================================================================
// INBOUND COMMANDS
// ============================================================================

/// `{"action": "credit", "person_id": "alice", "amount": 2.5}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    Credit { person_id: String, amount: f64 },
    Debit { person_id: String, amount: f64 },
}

impl Command {
    pub fn person_id(&self) -> &str {
        match self {
            Command::Credit { person_id, .. } | Command::Debit { person_id, .. } => person_id,
        }
    }
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct AllowanceTracker {
    store: BalanceStore,
    registry: Arc<PersonRegistry>,
    unit: String,
}

impl AllowanceTracker {
    /// Initialize the ledger and apply the configured roster.
    /// An empty roster is recovered from the accounts already in the ledger.
    pub fn open(config: &TrackerConfig) -> LedgerResult<Self> {
        let registry = Arc::new(PersonRegistry::new(config.orphan_policy));
        let store = BalanceStore::open(&config.db_path).with_notifier(registry.clone());
        store.initialize()?;

        let roster = if config.roster.is_empty() {
            store
                .list_accounts()?
                .into_iter()
                .map(|account| account.person_id)
                .collect()
        } else {
            config.roster.clone()
        };
        registry.set_roster(&store, &roster)?;

        info!(
            path = %config.db_path.display(),
            tracked = roster.len(),
            "Allowance tracker ready"
        );

        Ok(AllowanceTracker {
            store,
            registry,
            unit: config.unit_of_measurement.clone(),
        })
    }

    pub fn store(&self) -> &BalanceStore {
        &self.store
    }

    pub fn registry(&self) -> &PersonRegistry {
        &self.registry
    }

    pub fn credit(&self, person_id: &str, amount: f64) -> LedgerResult<()> {
        self.store.credit(person_id, amount)
    }

    pub fn debit(&self, person_id: &str, amount: f64) -> LedgerResult<()> {
        self.store.debit(person_id, amount)
    }

    pub fn get_balance(&self, person_id: &str) -> LedgerResult<f64> {
        self.store.get_balance(person_id)
    }

    /// Apply a command, then return the balance read after it committed
    pub fn dispatch(&self, command: &Command) -> LedgerResult<f64> {
        match command {
            Command::Credit { person_id, amount } => self.credit(person_id, *amount)?,
            Command::Debit { person_id, amount } => self.debit(person_id, *amount)?,
        }
        self.get_balance(command.person_id())
    }

    pub fn set_roster(&self, person_ids: &[String]) -> LedgerResult<RosterChange> {
        self.registry.set_roster(&self.store, person_ids)
    }

    pub fn roster(&self) -> Vec<String> {
        self.registry.roster()
    }

    pub fn orphans(&self) -> LedgerResult<Vec<String>> {
        self.registry.orphans(&self.store)
    }

    pub fn register_observer(&self, person_id: &str, observer: Arc<dyn Refreshable>) {
        self.registry.register_observer(person_id, observer);
    }

    /// Bind a fresh sensor to `person_id` and render its current balance.
    /// Bound before the first read, so a credit landing in between still refreshes it.
    pub fn attach_sensor(&self, person_id: &str) -> Arc<AllowanceSensor> {
        let sensor = Arc::new(AllowanceSensor::new(person_id, self.store.detached()).with_unit(&self.unit));
        self.registry.register_observer(person_id, sensor.clone());
        sensor.refresh();
        sensor
    }

    /// One sensor per roster member
    pub fn attach_sensors(&self) -> Vec<Arc<AllowanceSensor>> {
        self.roster().iter().map(|person_id| self.attach_sensor(person_id)).collect()
    }
}

// 📟 Allowance Sensor - display-side view of one person's balance
//
// Holds the last balance it rendered. refresh() re-reads the ledger; a failed
// read is logged and leaves the previous state in place.

use std::sync::{PoisonError, RwLock};
use tracing::warn;

use crate::db::BalanceStore;
use crate::registry::Refreshable;

pub const DEFAULT_UNIT: &str = "USD";

pub struct AllowanceSensor {
    person_id: String,
    store: BalanceStore,
    unit: String,
    state: RwLock<Option<f64>>,
}

impl AllowanceSensor {
    pub fn new(person_id: &str, store: BalanceStore) -> Self {
        AllowanceSensor {
            person_id: person_id.to_string(),
            store,
            unit: DEFAULT_UNIT.to_string(),
            state: RwLock::new(None),
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    /// "alice" → "Alice Allowance"
    pub fn name(&self) -> String {
        format!("{} Allowance", capitalize(&self.person_id))
    }

    pub fn unique_id(&self) -> String {
        format!("allowance_tracker_{}", self.person_id)
    }

    pub fn unit_of_measurement(&self) -> &str {
        &self.unit
    }

    /// Last rendered balance, None until the first refresh
    pub fn state(&self) -> Option<f64> {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Refreshable for AllowanceSensor {
    fn refresh(&self) {
        // Read under the lock: overlapping refreshes then finish in read order
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match self.store.get_balance(&self.person_id) {
            Ok(balance) => *state = Some(balance),
            Err(e) => warn!(person_id = %self.person_id, error = %e, "Sensor refresh failed"),
        }
    }
}

/// Upper-case the first character, lower-case the rest
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

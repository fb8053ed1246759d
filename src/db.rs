// 🗄️ Balance Store - durable person → balance ledger
//
// One SQLite file, one table. Every operation opens its own connection,
// mutates atomically and drops the handle. No balance is cached in-process.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::registry::ChangeNotifier;

/// How long a writer waits on a locked ledger before giving up.
/// SQLite locks the whole file for writes, so a writer waits on any open write
/// transaction, whoever's row it touches, and past this it fails with
/// `StorageUnavailable` (SQLITE_BUSY).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ACCOUNT
// ============================================================================

/// Persisted balance record for one person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable key, case preserved as supplied
    pub person_id: String,

    /// Signed balance, no floor
    pub balance: f64,

    /// Time of the last mutation (stored as RFC 3339)
    pub last_updated: DateTime<Utc>,
}

impl Account {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let last_updated: String = row.get(2)?;

        Ok(Account {
            person_id: row.get(0)?,
            balance: row.get(1)?,
            last_updated: DateTime::parse_from_rfc3339(&last_updated)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?
                .with_timezone(&Utc),
        })
    }

    pub fn is_overdrawn(&self) -> bool {
        self.balance < 0.0
    }
}

// ============================================================================
// BALANCE STORE
// ============================================================================

#[derive(Clone)]
pub struct BalanceStore {
    path: PathBuf,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl BalanceStore {
    /// Bind a store to a ledger file. Nothing is opened until the first operation.
    pub fn open(path: impl AsRef<Path>) -> Self {
        BalanceStore {
            path: path.as_ref().to_path_buf(),
            notifier: None,
        }
    }

    /// Attach the target signalled after every successful credit/debit
    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Same ledger, no notifier. Display-side readers hold this so they never
    /// keep the registry alive through the store.
    pub fn detached(&self) -> Self {
        BalanceStore::open(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> LedgerResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create the ledger schema if absent. Safe to call any number of times.
    pub fn initialize(&self) -> LedgerResult<()> {
        debug!(path = %self.path.display(), "Initializing ledger");
        let conn = self.connect()?;

        // WAL persists on the file, so concurrent readers never block the writer
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                person_id TEXT NOT NULL UNIQUE,
                balance REAL NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert a zero-balance account unless one already exists.
    /// Returns true when a row was created.
    pub fn ensure_account(&self, person_id: &str) -> LedgerResult<bool> {
        let conn = self.connect()?;
        let created = insert_if_absent(&conn, person_id)?;
        if created {
            debug!(person_id, "Created account");
        }
        Ok(created)
    }

    pub fn credit(&self, person_id: &str, amount: f64) -> LedgerResult<()> {
        debug!(person_id, amount, "Crediting allowance");
        self.apply_delta(person_id, checked_amount(amount)?)
    }

    pub fn debit(&self, person_id: &str, amount: f64) -> LedgerResult<()> {
        debug!(person_id, amount, "Debiting allowance");
        self.apply_delta(person_id, -checked_amount(amount)?)
    }

    /// Single read-modify-write inside one IMMEDIATE transaction.
    /// The account is created first, so an unknown person starts from zero.
    fn apply_delta(&self, person_id: &str, delta: f64) -> LedgerResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        insert_if_absent(&tx, person_id)?;
        let updated = tx.execute(
            "UPDATE accounts
             SET balance = balance + ?1, last_updated = ?2
             WHERE person_id = ?3",
            params![delta, Utc::now().to_rfc3339(), person_id],
        )?;

        if updated == 0 {
            // Dropping the transaction rolls it back
            return Err(LedgerError::UnknownAccount(person_id.to_string()));
        }

        tx.commit()?;
        drop(conn);

        if let Some(notifier) = &self.notifier {
            notifier.notify_changed(person_id);
        }

        Ok(())
    }

    /// Current balance, or 0 for a person the ledger has never seen
    pub fn get_balance(&self, person_id: &str) -> LedgerResult<f64> {
        debug!(person_id, "Getting balance");
        let conn = self.connect()?;

        let balance = conn
            .query_row(
                "SELECT balance FROM accounts WHERE person_id = ?1",
                [person_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(balance.unwrap_or(0.0))
    }

    pub fn get_account(&self, person_id: &str) -> LedgerResult<Option<Account>> {
        let conn = self.connect()?;

        let account = conn
            .query_row(
                "SELECT person_id, balance, last_updated FROM accounts WHERE person_id = ?1",
                [person_id],
                Account::from_row,
            )
            .optional()?;

        Ok(account)
    }

    /// Every row in the ledger, orphans included, ordered by person_id
    pub fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT person_id, balance, last_updated
             FROM accounts
             ORDER BY person_id",
        )?;

        let accounts = stmt
            .query_map([], Account::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Physically remove an account. Only the purge orphan policy calls this.
    pub fn delete_account(&self, person_id: &str) -> LedgerResult<bool> {
        debug!(person_id, "Deleting account");
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM accounts WHERE person_id = ?1", [person_id])?;
        Ok(deleted > 0)
    }
}

/// Sign and magnitude are the caller's business; only NaN and infinities are refused
fn checked_amount(amount: f64) -> LedgerResult<f64> {
    if amount.is_finite() {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

fn insert_if_absent(conn: &Connection, person_id: &str) -> LedgerResult<bool> {
    let inserted = conn.execute(
        "INSERT INTO accounts (person_id, balance, last_updated)
         VALUES (?1, 0, ?2)
         ON CONFLICT(person_id) DO NOTHING",
        params![person_id, Utc::now().to_rfc3339()],
    )?;
    Ok(inserted > 0)
}

// ============================================================================
// TESTS
// ============================================================================

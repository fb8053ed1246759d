// Ledger error taxonomy
//
// Storage failures propagate to the command dispatcher untouched.
// Notification failures never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Ledger file could not be opened, created or written
    #[error("ledger storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),

    /// Credit/debit affected no row for this person
    #[error("no account exists for '{0}'")]
    UnknownAccount(String),

    /// Amount is NaN or infinite
    #[error("invalid amount: {0}")]
    InvalidAmount(f64),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

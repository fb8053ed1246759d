// Allowance Tracker - Core Library
// Durable per-person balances with roster reconciliation and change notification

pub mod config;
pub mod db;
pub mod error;
pub mod registry;
pub mod sensor;
pub mod tracker;

use std::sync::Once;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use db::{Account, BalanceStore};
pub use error::{LedgerError, LedgerResult};
pub use registry::{ChangeNotifier, OrphanPolicy, PersonRegistry, Refreshable, RosterChange};
pub use sensor::AllowanceSensor;
pub use tracker::{AllowanceTracker, Command};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static INIT_TRACING: Once = Once::new();

/// Install the global fmt subscriber. `RUST_LOG` takes precedence over the
/// default `allowance_tracker=info` directive. Later calls are no-ops.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("allowance_tracker=info"));

        // Another subscriber may already be installed by the host
        let _ = fmt().with_env_filter(filter).try_init();
    });
}

//! steam-ledger: builds a per-game ledger of a Steam library (what was paid,
//! hours played, achievement progress, license provenance) and publishes it
//! to a spreadsheet.
pub mod config;
pub mod error;
pub mod licenses;
pub mod pipeline;
pub mod prices;
pub mod publish;
pub mod reconcile;
pub mod steam;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use error::{LedgerError, Result};

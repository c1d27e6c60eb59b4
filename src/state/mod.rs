//! Shared run state
//!
//! # Components
//!
//! - `RunPhase`: the coordinator's lifecycle (seeding, running, draining, finalized)
//! - `DedupLedger`: product keys already accepted in this run
//! - `Stats`: monotonically increasing run counters

mod ledger;
mod run_phase;
mod stats;

pub use ledger::DedupLedger;
pub use run_phase::RunPhase;
pub use stats::{Counter, Stats};

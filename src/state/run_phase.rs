/// Run phase definitions for the coordinator's state machine
///
/// A run always moves forward: it is seeded, runs until the frontier is
/// exhausted (or it is cancelled), drains its buffered state to storage and
/// ends finalized.
use std::fmt;

/// Lifecycle phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Initial requests are computed from the run mode and enqueued
    Seeding,

    /// Requests are dequeued, fetched, routed and their output applied
    Running,

    /// Stats, ledger and frontier are flushed to durable storage
    Draining,

    /// Terminal; the run summary has been produced
    Finalized,
}

impl RunPhase {
    /// Returns true if the run may move from this phase to `next`
    ///
    /// Seeding may skip straight to draining when the run is cancelled
    /// before any request is dispatched.
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Seeding, Self::Running)
                | (Self::Seeding, Self::Draining)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Finalized)
        )
    }

    /// Returns true once no further work will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeding => "seeding",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finalized => "finalized",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

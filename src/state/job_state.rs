/// Job state definitions for the listing dispatcher
///
/// This module defines the states a listing job moves through between the
/// queue and a worker.
use std::fmt;

/// Represents the current state of a listing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    // ===== Active States =====
    /// Job is admitted and waiting in the queue
    Queued,

    /// A worker has pulled the job and is fetching
    InFlight,

    // ===== Terminal States =====
    /// At least one sampled record was persisted (or already present)
    Done,

    /// The job produced no record (fetch failure, no candidates, cancellation)
    Dropped,
}

impl JobState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Dropped)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if `self -> next` is a legal transition
    ///
    /// Jobs only move forward: `Queued -> InFlight -> Done | Dropped`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Dropped)
        )
    }

    /// Converts the job state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Dropped => "dropped",
        }
    }

    /// Returns all possible job states
    pub fn all_states() -> [Self; 4] {
        [Self::Queued, Self::InFlight, Self::Done, Self::Dropped]
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

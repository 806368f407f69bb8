//! State module for tracking dispatched work
//!
//! # Components
//!
//! - `JobState`: Tracks a listing job from the queue to a terminal outcome
//! - `CompletionTracker`: Counting barrier the coordinator waits on until every
//!   admitted job has completed

mod completion;
mod job_state;

// Re-export main types
pub use completion::{CompletionGuard, CompletionTracker};
pub use job_state::JobState;

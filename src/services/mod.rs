//! Services layer for Slinger
//!
//! The window service owns all access to live window state; mutations it
//! issues run on the serial mutation queue.

pub mod mutation_queue;
pub mod window_service;

pub use mutation_queue::{MutationQueue, MutationResult, MutationTicket, QueueState};
pub use window_service::{TargetScreen, WindowService};

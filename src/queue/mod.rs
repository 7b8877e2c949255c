//! Client-side submission queue
//!
//! - Per-operation state machine with retry and backoff
//! - Registration chains (preorder, register, update)
//! - Tokio poll loop reading the registry snapshot

pub mod poller;
pub mod submission;

pub use poller::QueuePoller;
pub use submission::{
    is_applied, registration_chain, BroadcastError, Broadcaster, QueueConfig, QueueEntry, QueueError,
    SubmissionQueue, SubmissionState, DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT,
    DEFAULT_MAX_ATTEMPTS,
};

//! Dragnet Core - Orchestration primitives for the dragnet research server.
//!
//! This crate provides:
//! - The provider-error taxonomy and total error classifier
//! - Retry execution with exponential backoff, jitter, and cancellable sleeps
//! - A bounded fan-out executor (sliding-window pool) with order-preserving
//!   results and per-task failure isolation
//! - Deterministic budget allocators for tokens and comments
//!
//! Everything here is runtime machinery shared by every tool; nothing in
//! this crate performs I/O on its own.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod budget;
pub mod error;
pub mod fanout;
pub mod retry;

pub use budget::{CommentAllocation, TokenAllocation};
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use fanout::FanoutExecutor;
pub use retry::{RetryOutcome, RetryPolicy, run_with_retry};

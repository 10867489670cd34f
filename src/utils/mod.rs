//! Utility functions and helpers for marketcache.
//!
//! This module provides cross-cutting concerns like structured logging,
//! credential redaction, and retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization and URL redaction.
//! - `retry`: Retry mechanism for upstream calls that respects `Retry-After`.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;

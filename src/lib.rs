//! Taskmill - autonomous feature factory.
//!
//! A long-running daemon that accepts feature-development requests over
//! HTTP, persists them in a durable SQLite-backed priority queue, and
//! drives each one through a five-phase workflow (test generation, code
//! implementation, review, deployment, validation) by dispatching to
//! pluggable agents:
//! - at-most-one execution per task via compare-and-set claims
//! - bounded concurrent executor pool with backpressure
//! - crash recovery: orphaned RUNNING tasks are re-queued at startup
//! - cooperative cancellation at phase boundaries

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;

//! Domain layer: models, ports, and errors.
//!
//! Pure business types with no I/O. Adapters implement the ports; the
//! application layer composes them.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

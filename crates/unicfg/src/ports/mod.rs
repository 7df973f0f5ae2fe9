//! Ports (Interfaces)
//!
//! Abstract interfaces that define how the coordinator interacts with the
//! subsystems it ties together and with its observers.
//!
//! Implementations of these traits live in the infrastructure layer.

pub mod dependents;
pub mod observer;
pub mod services;

// Re-exports
pub use dependents::*;
pub use observer::*;
pub use services::*;

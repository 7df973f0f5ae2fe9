//! Subsystem Service Ports
//!
//! One contract per independently-owned subsystem. Every operation is
//! asynchronous and reports failure as a typed `DomainError`; only explicit
//! "not found" reads return `None`.

mod agent;
mod file;
mod personality;
mod role;

pub use agent::*;
pub use file::*;
pub use personality::*;
pub use role::*;

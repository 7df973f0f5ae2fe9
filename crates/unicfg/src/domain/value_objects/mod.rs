//! Value Objects
//!
//! Immutable objects defined by their attributes rather than identity.

mod behavior;
mod conflict_strategy;
mod consistency;
mod service;
mod validation;

pub use behavior::*;
pub use conflict_strategy::*;
pub use consistency::*;
pub use service::*;
pub use validation::*;

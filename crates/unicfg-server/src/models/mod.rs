//! API Models (DTOs)

mod configuration;
mod operations;

pub use configuration::*;
pub use operations::*;

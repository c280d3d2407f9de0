//! Domain layer - Volume model, capability model and port definitions
//!
//! This module defines the records every driver manipulates and the traits
//! (ports) that drivers and metadata stores implement, following hexagonal
//! architecture principles.

pub mod capability;
pub mod ports;
pub mod requests;
pub mod volume;

pub use capability::*;
pub use ports::*;
pub use requests::*;
pub use volume::*;

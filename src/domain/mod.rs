//! Domain layer - Entities, requests and port definitions
//!
//! This module defines the persisted record types and the traits (ports)
//! that subsystem adapters implement, following hexagonal architecture
//! principles.

pub mod ports;
pub mod records;
pub mod requests;

pub use ports::*;
pub use records::*;
pub use requests::*;

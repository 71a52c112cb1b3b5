//! State Module
//!
//! Atomic file primitives and the file-backed store holding the
//! authoritative SVM, volume and snapshot records.

pub mod atomic;
pub mod store;

pub use store::{Collection, StateStore};

//! Domain layer types and invariants.

pub mod actor;
pub mod certificates;
pub mod entities;
pub mod lessons;
pub mod lifecycle;
pub mod progress;
pub mod types;

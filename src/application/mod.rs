//! Application services layer.

pub mod audit;
pub mod certificates;
pub mod enrollments;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod pagination;
pub mod progress;
pub mod repos;

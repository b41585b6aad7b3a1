//! Domain module - Core business logic and entities
//!
//! Entities, repository interfaces, and collaborator contracts for the
//! batch scheduling and checkpoint engine.

pub mod batch;
pub mod catalog;
pub mod error;
pub mod repositories;
pub mod services;

// Re-export commonly used items for convenience
pub use batch::{
    BatchPageError, BatchPhase, BatchState, BatchStatus, PhaseStatus, RetryStatistics,
};
pub use catalog::{CatalogItem, CatalogPage, ImageData};
pub use error::{BatchError, BatchResult};

//! catalog-batch - Checkpointed batch ingestion from an external catalog
//!
//! Long-running, rate-limited ingestion of a paginated catalog API into a
//! durable item store and object storage. A batch is one calendar day's
//! work, split into two ordered phases (item registration, then image
//! download) with page-level checkpointing, fixed-schedule retry backoff,
//! and manual-intervention escalation when the retry budget runs out.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

//! Application module - Use cases and service orchestration
//!
//! Services that drive the batch state machine, the partial-retry repair
//! paths, and the two job drivers that consume them.

pub mod batch_state_service;
pub mod catalog_service;
pub mod job_scheduling_service;
pub mod job_trigger_service;
pub mod jobs;
pub mod partial_retry_service;

pub use batch_state_service::BatchStateService;
pub use catalog_service::CatalogService;
pub use job_scheduling_service::{JobSchedulingService, ProceedCheck};
pub use job_trigger_service::{JobTriggerService, PartialRetryOutcome, TriggerOutcome};
pub use jobs::{JobDriver, JobKind, JobOutcome};
pub use partial_retry_service::PartialRetryService;

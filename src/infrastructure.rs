//! Infrastructure module - External concerns and implementations
//!
//! Concrete implementations of the domain's repository and collaborator
//! interfaces, plus configuration, logging, and database plumbing.

pub mod batch_state_repository;
pub mod blob_store;
pub mod catalog_client;
pub mod config;
pub mod content_type;
pub mod database_connection;
pub mod item_repository;
pub mod logging;
pub mod page_error_repository;

pub use batch_state_repository::SqliteBatchStateRepository;
pub use blob_store::FsBlobStore;
pub use catalog_client::HttpCatalogClient;
pub use config::AppConfig;
pub use content_type::extension_for_content_type;
pub use database_connection::DatabaseConnection;
pub use item_repository::SqliteItemRepository;
pub use logging::init_logging;
pub use page_error_repository::SqlitePageErrorRepository;

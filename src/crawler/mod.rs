pub mod controller;
pub mod dedup;
pub mod error;
pub mod frontier;
pub mod listing;
pub mod pagination;
pub mod product;
pub mod quota;
pub mod scheduler;
pub mod task;

// Re-export common types
pub use controller::CrawlerController;
pub use error::CrawlError;
pub use product::{Gender, PartialProduct, Product};
pub use task::{CrawlTask, TaskFailure, TaskKind};

pub mod config;
pub mod database;
pub mod queue_repository;
pub mod writer;

pub use config::QueueDbConfig;
pub use database::Database;
pub use queue_repository::SqliteWorkQueue;
pub use writer::ResultWriter;

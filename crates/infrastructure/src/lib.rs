pub mod database;
pub mod error_handling;
pub mod esis;
pub mod observability;

pub use database::{DatabaseManager, SqliteJobStore, SqliteMessageStore};
pub use esis::EsisSoapClient;
pub use observability::*;

//! Local persistence: database initialization and the offline queue

pub mod init;
pub mod storage;

pub use init::init_database;
pub use storage::{PlanFields, SendFields, Signatures, StorageRecord, StorageStore};

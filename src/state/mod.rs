pub mod backend;
pub mod file;
pub mod models;
pub mod sqlite;

pub use backend::StateBackend;
pub use file::FileBackend;
pub use models::{ResourceIdentity, ResourceRecord, ResourceStatus};
pub use sqlite::SqliteBackend;

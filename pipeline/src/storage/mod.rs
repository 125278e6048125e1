mod in_memory;
mod libsql_storage;

pub use eventmesh_core::storage::{ChangeOutcome, Storage};
pub use in_memory::InMemoryStorage;
pub use libsql_storage::LibsqlStorage;

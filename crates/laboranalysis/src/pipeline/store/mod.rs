mod memory;
mod sqlite;

pub use memory::InMemoryQueueStore;
pub use sqlite::SqliteQueueStore;

// Warehouse loading: tenant-scoped staging areas and atomic snapshot swaps

pub mod in_memory;
pub mod sqlite;
pub mod traits;

pub use in_memory::InMemoryWarehouse;
pub use sqlite::SqliteWarehouse;
pub use traits::{StagingHandle, Warehouse};

//! Warehouse loading with a full-overwrite policy.
//!
//! - `DeltaWarehouse`: Delta Lake tables under a root URL
//! - `MemoryWarehouse`: in-process tables for tests and dry runs

mod delta;
mod memory;
mod traits;

pub use delta::DeltaWarehouse;
pub use memory::MemoryWarehouse;
pub use traits::{LoadReceipt, TableRef, Warehouse, WarehouseRef};

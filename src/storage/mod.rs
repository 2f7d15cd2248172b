pub mod disk_vec;
pub mod handle_map;
pub mod string_pool;
pub mod symbol_table;

pub use disk_vec::{DiskVec, Record};
pub use handle_map::HandleMap;
pub use string_pool::{StringHandle, StringPool, MAX_STRING_BYTES};
pub use symbol_table::SymbolTable;

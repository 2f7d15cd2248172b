pub mod buffer;
pub mod device;
pub mod disk;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod storage;
pub mod types;

mod query;

pub use crate::buffer::BufferGraph;
pub use crate::device::DeviceGraph;
pub use crate::disk::{DependencyRef, DiskGraph, PackageRef, VersionRef};
pub use crate::error::{GraphError, Result};
pub use crate::graph::{Config, DependencyGraph};
pub use crate::loader::PackageLoader;
pub use crate::model::{DependencyGroup, DependencyItem, DependencyLevel, DependencyResult};
pub use crate::types::{OpenCode, OpenMode};

pub mod json_file;
pub mod memory;
pub mod validation;

pub use json_file::JsonFileSnapshotStore;
pub use memory::InMemorySnapshotStore;
pub use validation::FormatValidator;

pub mod field_validator;
pub mod snapshot_store;

pub use field_validator::FieldValidator;
pub use snapshot_store::{SNAPSHOT_VERSION, Snapshot, SnapshotStore};

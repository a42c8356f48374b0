pub mod book;
pub mod commands;
pub mod entity;
pub mod errors;
pub mod member;
pub mod policy;
pub mod transaction;
pub mod value_objects;

pub use book::*;
pub use entity::*;
pub use errors::*;
pub use member::*;
pub use transaction::*;
pub use value_objects::*;

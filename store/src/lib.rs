pub mod file;
pub mod model;

pub use file::{DocumentStore, FileStore};
pub use model::*;

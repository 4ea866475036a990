pub mod admin;
pub mod bids;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod notify;
pub mod usage;
pub mod view;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};

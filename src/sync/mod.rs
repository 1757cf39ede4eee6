pub mod classify;
pub mod context;
pub mod diff;
pub mod engine;
pub mod scheduler;

pub use engine::SyncEngine;

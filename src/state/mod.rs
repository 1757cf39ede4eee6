pub mod response_cache;
pub mod sync_state;

pub use response_cache::ResponseCache;
pub use sync_state::SyncState;

//! Background Tasks Module
//!
//! Contains background tasks that may run alongside a cache.
//!
//! # Tasks
//! - Expiry Cleanup: Removes expired cache entries at a configured interval

mod cleanup;

pub use cleanup::{spawn_cleanup_task, CleanupTarget};

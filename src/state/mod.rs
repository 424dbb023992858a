//! Local run state.
//!
//! This module keeps the state that lives outside the tenant file:
//! - A run lock preventing concurrent applies
//! - A history of recent runs

mod local;
mod lock;
mod types;

pub use local::{LocalRunStore, STATE_DIR};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
pub use types::{HISTORY_VERSION, MAX_HISTORY, RunHistory, RunRecord};

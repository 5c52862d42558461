//! Application state shared across request handlers.

use biznesplan_engine::Pipeline;
use biznesplan_storage::MemoryStore;

use crate::config::Settings;

pub(crate) struct AppState {
    /// Non-locking reads (status polling, log tailing).
    pub(crate) store: MemoryStore,
    /// All writes go through the pipeline so every transition carries its
    /// audit entry.
    pub(crate) pipeline: Pipeline<MemoryStore>,
    pub(crate) settings: Settings,
}

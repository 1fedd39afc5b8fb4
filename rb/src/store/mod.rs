//! State management
//!
//! `StoreManager` owns the durable callstore and processes messages via
//! channels; `MemoryStore` keeps everything in process. Both implement the
//! storage traits the engine is written against.

use std::sync::Arc;

mod manager;
mod memory;
mod messages;
mod traits;

pub use manager::StoreManager;
pub use memory::MemoryStore;
pub use messages::{StateError, StateResponse, StoreCommand};
pub use traits::{HistoryStore, RecallStore, ReminderStore};

/// The three collections the engine works with
#[derive(Clone)]
pub struct Stores {
    pub reminders: Arc<dyn ReminderStore>,
    pub recalls: Arc<dyn RecallStore>,
    pub history: Arc<dyn HistoryStore>,
}

impl Stores {
    /// Use one backend for all three collections
    pub fn shared<S>(store: S) -> Self
    where
        S: ReminderStore + RecallStore + HistoryStore + 'static,
    {
        let store = Arc::new(store);
        Self {
            reminders: store.clone(),
            recalls: store.clone(),
            history: store,
        }
    }
}

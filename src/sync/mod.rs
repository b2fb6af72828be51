pub mod controller;
pub mod intents;

pub use controller::SyncController;
pub use intents::{Intent, IntentOperation, IntentRepository, IntentStatus};

pub mod content;
pub mod error;
pub mod generation;
pub mod lock;
pub mod metrics;
pub mod retry;
pub mod state;

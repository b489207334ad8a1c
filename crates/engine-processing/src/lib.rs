pub mod batch;
pub mod error;
pub mod fetcher;
pub mod import_gate;
pub mod mapping;
pub mod reconciler;
pub mod reducer;

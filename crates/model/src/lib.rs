pub mod artifact;
pub mod item;
pub mod job;
pub mod pagination;
pub mod phase;
pub mod target;

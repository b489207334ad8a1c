pub mod content;
pub mod generation;

pub mod actor;
pub mod coordinator;
pub mod error;
pub mod sequencer;

#[cfg(test)]
mod tests;

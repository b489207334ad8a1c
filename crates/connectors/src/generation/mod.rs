pub mod http;
pub mod memory;
pub mod wire;

pub use http::HttpGenerationClient;
pub use memory::InMemoryGenerationService;

//! Built-in graph backends.

mod memory;

pub use memory::InMemoryGraphBackend;

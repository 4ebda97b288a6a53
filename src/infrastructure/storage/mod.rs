//! In-memory storage for development and tests

mod memory;

pub use memory::InMemoryRepositories;

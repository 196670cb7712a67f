//! Concrete contents backends.

mod memory;

pub use memory::MemoryBackend;

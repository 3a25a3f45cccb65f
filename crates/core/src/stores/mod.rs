pub mod filesystem;
pub mod memory;

pub use filesystem::FsIndexStore;
pub use memory::MemoryIndexStore;

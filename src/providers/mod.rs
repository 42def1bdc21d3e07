//! Snapshot source implementations

pub mod scripted;
#[cfg(windows)]
pub mod shared_memory;

pub use scripted::ScriptedSource;
#[cfg(windows)]
pub use shared_memory::SharedMemorySource;

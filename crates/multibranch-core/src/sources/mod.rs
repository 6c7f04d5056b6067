//! Concrete repository sources.

pub mod git;
pub mod manifest;
pub mod memory;

pub use git::GitSource;
pub use manifest::ManifestSource;
pub use memory::MemorySource;

pub mod memory_source;
pub mod met_source;

pub use memory_source::MemorySource;
pub use met_source::MetMuseumSource;

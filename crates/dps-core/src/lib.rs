pub mod allocator;
pub mod config;
pub mod logging;
pub mod partitioner;
pub mod probe;
pub mod processor;
pub mod scheduler;

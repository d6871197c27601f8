pub mod error;
pub mod manager;
pub mod parallel;
pub mod replacer;

pub use error::BufferPoolError;
pub use manager::{BufferPool, BufferPoolManager};
pub use parallel::ParallelBufferPoolManager;

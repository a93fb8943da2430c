pub mod prefetch;

pub use prefetch::Prefetcher;

// Re-export crossbeam_channel for embedding callers
pub use crossbeam_channel;

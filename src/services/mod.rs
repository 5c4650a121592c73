pub mod consumer;
pub mod image_fetcher;
pub mod processor;
pub mod queue;

// Library interface for wirefeed modules
// This allows tests and other binaries to import modules

pub mod aggregate;
pub mod cache;
pub mod clock;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod normalize;
pub mod server;
pub mod service;
pub mod summarize;
pub mod warmer;
pub mod weather;

pub mod chain;
pub mod config;
pub mod detector;
pub mod engine;
pub mod metadata;
pub mod metrics;
pub mod persistence;
pub mod scheduler;
pub mod sources;
pub mod supervisor;
pub mod types;
pub mod utils;

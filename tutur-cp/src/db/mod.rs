//! Persistence helpers over the shared KV store

pub mod jobs;

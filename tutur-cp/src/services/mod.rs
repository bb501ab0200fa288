//! Pipeline services
//!
//! The moving parts between an incoming correction request and a provider
//! call: quota accounting, the two-tier result cache, provider metrics, the
//! fallback router, the aggregation queue, the shared correction path, and
//! the job stream orchestrator.

pub mod batching;
pub mod cache;
pub mod correction;
pub mod metrics;
pub mod orchestrator;
pub mod quota;
pub mod router;

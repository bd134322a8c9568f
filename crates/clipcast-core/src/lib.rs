//! HTTP and observability plumbing shared by Clipcast services.

pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;

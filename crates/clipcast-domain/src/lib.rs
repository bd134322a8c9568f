//! Shared domain types for Clipcast services.

pub mod id;
pub mod pagination;
pub mod schedule;
pub mod user;

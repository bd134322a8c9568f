//! Request authentication types shared across Clipcast services.

pub mod cron;
pub mod identity;

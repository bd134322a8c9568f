pub mod dispatch;
pub mod retry;
pub mod schedule;

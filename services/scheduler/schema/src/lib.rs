//! sea-orm entities for the scheduler service.

pub mod reviews;
pub mod schedules;

//! Turning a prescription into concrete, time-stamped calendar reminders.

pub mod dosage;
pub mod error;
pub mod expander;
pub mod payload;

pub use dosage::{DosagePattern, Slot};
pub use error::ScheduleError;
pub use expander::{expand, expand_all, total_doses};
pub use payload::{DateTimeTimeZone, ItemBody, ReminderEvent};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid dosage pattern {pattern:?}: {reason}")]
    InvalidDosagePattern { pattern: String, reason: String },

    #[error("invalid duration for {medicine}: days must be at least 1")]
    InvalidDuration { medicine: String },

    #[error("schedule for {medicine} runs past the supported date range")]
    DateOutOfRange { medicine: String },
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ScheduleError;

/// One of the three fixed daily dose slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Morning,
    Afternoon,
    Evening,
}

impl Slot {
    /// All slots in the order they occur during a day.
    pub const ALL: [Slot; 3] = [Slot::Morning, Slot::Afternoon, Slot::Evening];

    /// Local wall-clock hour of the reminder.
    pub fn hour(self) -> u32 {
        match self {
            Slot::Morning => 9,
            Slot::Afternoon => 14,
            Slot::Evening => 21,
        }
    }

    /// Label shown in the reminder body, e.g. "2:00 PM".
    pub fn label(self) -> &'static str {
        match self {
            Slot::Morning => "9:00 AM",
            Slot::Afternoon => "2:00 PM",
            Slot::Evening => "9:00 PM",
        }
    }
}

/// A parsed `morning+afternoon+evening` dosage pattern such as `"1+0+1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosagePattern {
    counts: [u32; 3],
}

impl DosagePattern {
    pub fn new(morning: u32, afternoon: u32, evening: u32) -> Self {
        Self {
            counts: [morning, afternoon, evening],
        }
    }

    /// Dose count recorded for a slot.
    pub fn count(&self, slot: Slot) -> u32 {
        match slot {
            Slot::Morning => self.counts[0],
            Slot::Afternoon => self.counts[1],
            Slot::Evening => self.counts[2],
        }
    }

    /// Slots with a dose, in daily order. A count above one still yields the slot once.
    pub fn active_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        Slot::ALL.into_iter().filter(|slot| self.count(*slot) > 0)
    }

    /// Sum of the three counts.
    pub fn doses_per_day(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Comma-separated slot labels, e.g. "9:00 AM, 9:00 PM".
    pub fn describe(&self) -> String {
        self.active_slots()
            .map(Slot::label)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for DosagePattern {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ScheduleError::InvalidDosagePattern {
            pattern: s.to_string(),
            reason,
        };

        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        if tokens.len() != 3 {
            return Err(invalid(format!("expected 3 slots, found {}", tokens.len())));
        }

        let mut counts = [0u32; 3];
        for (count, token) in counts.iter_mut().zip(&tokens) {
            *count = token
                .parse::<u32>()
                .map_err(|_| invalid(format!("{token:?} is not a non-negative integer")))?;
        }

        Ok(Self { counts })
    }
}

impl fmt::Display for DosagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}+{}", self.counts[0], self.counts[1], self.counts[2])
    }
}

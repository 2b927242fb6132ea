use chrono::{
    DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use tracing::debug;

use super::dosage::DosagePattern;
use super::error::ScheduleError;
use super::payload::{create_event, ReminderEvent};
use crate::prescription::Medicine;

/// Expand one medicine into its reminder events.
///
/// Events are ordered by day, then morning/afternoon/evening within a day.
/// The pattern and duration are validated up front; on error nothing is produced.
pub fn expand(
    medicine: &Medicine,
    start_date: NaiveDate,
    time_zone: Tz,
) -> Result<Vec<ReminderEvent>, ScheduleError> {
    let pattern: DosagePattern = medicine.dosage_pattern.parse()?;
    if medicine.days == 0 {
        return Err(ScheduleError::InvalidDuration {
            medicine: medicine.name.clone(),
        });
    }

    let zone_name = time_zone.name();
    let mut events = Vec::new();

    for offset in 0..medicine.days {
        let date = start_date
            .checked_add_days(Days::new(u64::from(offset)))
            .ok_or_else(|| ScheduleError::DateOutOfRange {
                medicine: medicine.name.clone(),
            })?;

        for slot in pattern.active_slots() {
            let start = local_wall_clock(time_zone, date, slot.hour());
            events.push(create_event(&medicine.name, &start, zone_name, slot));
        }
    }

    debug!(
        medicine = %medicine.name,
        pattern = %pattern,
        days = medicine.days,
        events = events.len(),
        "expanded dosage schedule"
    );

    Ok(events)
}

/// Expand every medicine of a prescription, concatenated in prescription order.
pub fn expand_all(
    medicines: &[Medicine],
    start_date: NaiveDate,
    time_zone: Tz,
) -> Result<Vec<ReminderEvent>, ScheduleError> {
    let mut all = Vec::new();
    for medicine in medicines {
        all.extend(expand(medicine, start_date, time_zone)?);
    }
    Ok(all)
}

/// Number of doses over the whole course, counting every unit in the pattern.
pub fn total_doses(medicine: &Medicine) -> Result<u32, ScheduleError> {
    let pattern: DosagePattern = medicine.dosage_pattern.parse()?;
    Ok(pattern.doses_per_day().saturating_mul(medicine.days))
}

/// Resolve `hour:00` on `date` in `tz`.
///
/// A time inside a DST gap moves forward one hour; an ambiguous time takes the
/// earlier instant.
fn local_wall_clock(tz: Tz, date: NaiveDate, hour: u32) -> DateTime<Tz> {
    let naive = date
        .and_hms_opt(hour, 0, 0)
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN));

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let shifted: NaiveDateTime = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive).with_timezone(&tz))
        }
    }
}

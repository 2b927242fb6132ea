use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::dosage::Slot;

/// Length of every reminder event.
pub const EVENT_DURATION_MINUTES: i64 = 15;

/// How long before the event the calendar should alert.
pub const REMINDER_LEAD_MINUTES: u32 = 15;

/// A medicine reminder in the Microsoft Graph `event` shape, ready to be POSTed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderEvent {
    pub subject: String,
    pub body: ItemBody,
    pub start: DateTimeTimeZone,
    pub end: DateTimeTimeZone,
    pub reminder_minutes_before_start: u32,
    pub is_reminder_on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    pub content_type: String,
    pub content: String,
}

/// An absolute instant tagged with the IANA zone the schedule was computed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    #[serde(with = "utc_millis")]
    pub date_time: DateTime<Utc>,
    pub time_zone: String,
}

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`, the form Graph echoes back for event times.
mod utc_millis {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}

impl ReminderEvent {
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.date_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end.date_time
    }
}

/// Build the reminder for one dose of `medicine_name` starting at `start`.
pub fn create_event<Tz: TimeZone>(
    medicine_name: &str,
    start: &DateTime<Tz>,
    time_zone: &str,
    slot: Slot,
) -> ReminderEvent {
    let start_utc = start.with_timezone(&Utc);
    let end_utc = start_utc + Duration::minutes(EVENT_DURATION_MINUTES);

    ReminderEvent {
        subject: format!("💊 Take {medicine_name}"),
        body: ItemBody {
            content_type: "HTML".to_string(),
            content: format!(
                "<p>Time to take your medicine: <strong>{medicine_name}</strong></p>\
                 <p>Scheduled time: {}</p>\
                 <p><em>This is an automated reminder from your prescription calendar.</em></p>",
                slot.label()
            ),
        },
        start: DateTimeTimeZone {
            date_time: start_utc,
            time_zone: time_zone.to_string(),
        },
        end: DateTimeTimeZone {
            date_time: end_utc,
            time_zone: time_zone.to_string(),
        },
        reminder_minutes_before_start: REMINDER_LEAD_MINUTES,
        is_reminder_on: true,
    }
}


use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

pub const CHILE_TZ: Tz = chrono_tz::America::Santiago;

/// Lower bound for any timer armed against the next midnight.
pub const MIN_MIDNIGHT_DELAY: std::time::Duration = std::time::Duration::from_millis(1);

pub fn chile_now(at: DateTime<Utc>) -> DateTime<Tz> {
    at.with_timezone(&CHILE_TZ)
}

pub fn chile_today(at: DateTime<Utc>) -> NaiveDate {
    chile_now(at).date_naive()
}

/// Santiago springs forward at local midnight; on that date the day starts at 01:00.
pub fn start_of_chile_day(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    for hour in 0..4 {
        let candidate = midnight + TimeDelta::hours(hour);
        if let Some(local) = CHILE_TZ.from_local_datetime(&candidate).earliest() {
            return local.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&midnight)
}

pub fn next_chile_midnight(at: DateTime<Utc>) -> DateTime<Utc> {
    let today = chile_today(at);
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    start_of_chile_day(tomorrow)
}

pub fn until_next_chile_midnight(at: DateTime<Utc>) -> std::time::Duration {
    (next_chile_midnight(at) - at)
        .to_std()
        .unwrap_or_default()
        .max(MIN_MIDNIGHT_DELAY)
}

pub fn format_chile(at: DateTime<Utc>) -> String {
    chile_now(at).format("%Y-%m-%d %H:%M %Z").to_string()
}

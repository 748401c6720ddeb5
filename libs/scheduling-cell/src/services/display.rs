use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use practice_cell::PracticeSnapshot;

/// Resolve the practice's IANA timezone, falling back to the configured
/// default and finally to Central time. Display strings and the lunch window
/// are both anchored here.
pub fn resolve_timezone(practice: &PracticeSnapshot, default_timezone: &str) -> Tz {
    if let Some(tz_name) = &practice.timezone {
        if let Ok(tz) = tz_name.parse::<Tz>() {
            return tz;
        }
        warn!(
            "Practice {} has unparsable timezone '{}', falling back to default",
            practice.id, tz_name
        );
    }

    default_timezone.parse::<Tz>().unwrap_or(chrono_tz::America::Chicago)
}

/// 12-hour clock without a leading zero, e.g. "9:00 AM", "2:05 PM". Formatted
/// by hand because this exact shape is the key callers echo back when they
/// pick a slot.
pub fn format_12h(instant: DateTime<Utc>, tz: &Tz) -> String {
    let local = instant.with_timezone(tz);
    let (is_pm, hour) = local.hour12();
    format!(
        "{}:{:02} {}",
        hour,
        local.minute(),
        if is_pm { "PM" } else { "AM" }
    )
}

/// Parse a spoken-style display time back into a local wall-clock time.
/// Accepts the shapes `format_12h` produces plus loose variants ("2 PM",
/// "2:05pm").
pub fn parse_display_time(raw: &str) -> Option<NaiveTime> {
    let normalized = raw.trim().to_uppercase();

    let (time_part, meridiem) = if let Some(stripped) = normalized.strip_suffix("PM") {
        (stripped.trim(), Some(true))
    } else if let Some(stripped) = normalized.strip_suffix("AM") {
        (stripped.trim(), Some(false))
    } else {
        (normalized.as_str(), None)
    };

    let (hour_str, minute_str) = match time_part.split_once(':') {
        Some((h, m)) => (h.trim(), m.trim()),
        None => (time_part, "0"),
    };

    let hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = minute_str.parse().ok()?;

    let hour = match meridiem {
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        _ => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Human-readable date for confirmation lines, e.g. "Tuesday, March 4".
pub fn friendly_date(date: NaiveDate) -> String {
    format!(
        "{}, {} {}",
        weekday_name(date),
        month_name(date),
        date.day()
    )
}

fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

fn month_name(date: NaiveDate) -> &'static str {
    match date.month() {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

/// Interpret a local wall-clock time on a date in the practice timezone and
/// return the UTC instant. DST gaps have no local representation; ambiguous
/// times (fall-back hour) take the earlier instant.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chicago() -> Tz {
        "America/Chicago".parse().unwrap()
    }

    #[test]
    fn formats_without_leading_zero() {
        let tz = chicago();
        // 2025-03-04 15:05 UTC is 9:05 AM in Chicago (CST, UTC-6).
        let instant = Utc.with_ymd_and_hms(2025, 3, 4, 15, 5, 0).unwrap();
        assert_eq!(format_12h(instant, &tz), "9:05 AM");

        let afternoon = Utc.with_ymd_and_hms(2025, 3, 4, 20, 30, 0).unwrap();
        assert_eq!(format_12h(afternoon, &tz), "2:30 PM");
    }

    #[test]
    fn noon_and_midnight_render_as_twelve() {
        let tz = chicago();
        let noon = Utc.with_ymd_and_hms(2025, 3, 4, 18, 0, 0).unwrap();
        assert_eq!(format_12h(noon, &tz), "12:00 PM");

        let midnight = Utc.with_ymd_and_hms(2025, 3, 4, 6, 0, 0).unwrap();
        assert_eq!(format_12h(midnight, &tz), "12:00 AM");
    }

    #[test]
    fn parses_display_time_variants() {
        assert_eq!(
            parse_display_time("2:05 PM"),
            NaiveTime::from_hms_opt(14, 5, 0)
        );
        assert_eq!(
            parse_display_time("2pm"),
            NaiveTime::from_hms_opt(14, 0, 0)
        );
        assert_eq!(
            parse_display_time("12:00 AM"),
            NaiveTime::from_hms_opt(0, 0, 0)
        );
        assert_eq!(
            parse_display_time("9:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(parse_display_time("soonish"), None);
    }

    #[test]
    fn round_trips_through_format_and_parse() {
        let tz = chicago();
        let instant = Utc.with_ymd_and_hms(2025, 3, 4, 19, 45, 0).unwrap();
        let display = format_12h(instant, &tz);
        let parsed = parse_display_time(&display).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(local_to_utc(date, parsed, &tz), Some(instant));
    }

    #[test]
    fn friendly_date_names_weekday_and_month() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        assert_eq!(friendly_date(date), "Tuesday, March 4");
    }

    #[test]
    fn unknown_timezone_falls_back() {
        let practice = PracticeSnapshot {
            id: "practice-1".to_string(),
            nexhealth_subdomain: "smiles".to_string(),
            nexhealth_location_id: 1,
            timezone: Some("Mars/Olympus_Mons".to_string()),
            appointment_types: vec![],
            providers: vec![],
            operatories: vec![],
        };
        assert_eq!(
            resolve_timezone(&practice, "America/New_York"),
            "America/New_York".parse::<Tz>().unwrap()
        );
    }
}

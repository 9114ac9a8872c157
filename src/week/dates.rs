use time::{format_description::FormatItem, macros::format_description, Date, Duration};

const LABEL: &[FormatItem<'static>] = format_description!("[weekday] [day] [month repr:long]");

/// Labels for `days` consecutive days of the week being planned.
///
/// The current week is planned while more than one working day (today
/// through Friday) is left; otherwise planning moves to next Monday.
pub fn week_labels(today: Date, days: usize) -> Vec<String> {
    let start = week_start(today);
    (0..days as i64)
        .map(|i| format_label(start + Duration::days(i)))
        .collect()
}

pub fn week_start(today: Date) -> Date {
    let weekday = today.weekday().number_days_from_monday() as i64;
    let remaining_workdays = (5 - weekday).max(0);
    if remaining_workdays > 1 {
        today - Duration::days(weekday)
    } else {
        today + Duration::days(7 - weekday)
    }
}

pub fn actual_date(today: Date) -> String {
    format_label(today)
}

fn format_label(date: Date) -> String {
    date.format(LABEL).unwrap_or_else(|_| date.to_string())
}

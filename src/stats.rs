//! Trend derivation over a user's mood history.
//!
//! Calendar days are UTC days of `created_at`.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::models::mood_entry::MoodEntry;

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Consecutive calendar days with at least one entry, counting back from
/// `today` and stopping at the first day without one.
pub fn streak(entries: &[MoodEntry], today: NaiveDate) -> u32 {
    let mut dates: Vec<NaiveDate> = entries
        .iter()
        .map(|e| e.created_at.date_naive())
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let mut current_streak = 0u32;
    let mut check_date = today;

    for date in &dates {
        if *date == check_date {
            current_streak += 1;
            check_date -= Duration::days(1);
        } else if *date < check_date {
            break;
        }
    }

    current_streak
}

/// Mean mood score, 0.0 for no entries.
pub fn average_mood(entries: &[MoodEntry]) -> f64 {
    if entries.is_empty() {
        return 0.0;
    }
    entries.iter().map(|e| e.mood_score as f64).sum::<f64>() / entries.len() as f64
}

/// Short weekday name with the highest mean score, or `"N/A"`.
/// Ties resolve to the earlier weekday (Monday first).
pub fn best_day(entries: &[MoodEntry]) -> String {
    let mut totals = [(0i64, 0u32); 7];
    for entry in entries {
        let idx = entry.created_at.weekday().num_days_from_monday() as usize;
        totals[idx].0 += entry.mood_score as i64;
        totals[idx].1 += 1;
    }

    let mut best: Option<(usize, f64)> = None;
    for (idx, (total, count)) in totals.iter().enumerate() {
        if *count == 0 {
            continue;
        }
        let mean = *total as f64 / *count as f64;
        if best.map_or(true, |(_, best_mean)| mean > best_mean) {
            best = Some((idx, mean));
        }
    }

    best.map(|(idx, _)| WEEKDAYS[idx].to_string())
        .unwrap_or_else(|| "N/A".into())
}

/// Percentage change of the later half's mean against the earlier half's.
/// `None` with fewer than two entries or a zero baseline.
pub fn improvement(entries: &[MoodEntry]) -> Option<f64> {
    if entries.len() < 2 {
        return None;
    }

    let mut sorted: Vec<&MoodEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.created_at);

    let mid = sorted.len() / 2;
    let mean = |half: &[&MoodEntry]| {
        half.iter().map(|e| e.mood_score as f64).sum::<f64>() / half.len() as f64
    };
    let first = mean(&sorted[..mid]);
    let second = mean(&sorted[mid..]);

    if first == 0.0 {
        return None;
    }
    Some((second - first) / first * 100.0)
}

/// `+12.5%`, `-3.0%`, `0.0%`, or `N/A`.
pub fn format_improvement(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 => format!("+{:.1}%", v),
        Some(v) => format!("{:.1}%", v),
        None => "N/A".into(),
    }
}

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::types::RecordingStart;

/// Splits a header line into tokens after collapsing runs of whitespace.
pub fn simplified_tokens(line: &str) -> Vec<&str> {
    line.split_whitespace().collect()
}

/// 非本地化的整数解析（避免受系统locale影响）
///
/// Returns 0 for anything that is not a plain integer.
pub fn atoi_nonlocalized(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// Rounds half away from zero and converts to an integer.
pub fn round_to_int(value: f64) -> i64 {
    value.round() as i64
}

/// Parses the start time from a legacy header's first line.
///
/// The time token sits at index 4 unless that token has no colon, in which
/// case time and date are at 5 and 6. Composite `d/M/yyyy h:m:s` is tried
/// first, then time alone.
pub fn parse_legacy_start(tokens: &[&str]) -> Option<RecordingStart> {
    let mut time = tokens.get(4).copied().unwrap_or("");
    let mut date = tokens.get(5).copied().unwrap_or("");

    if !time.contains(':') {
        time = tokens.get(5).copied().unwrap_or("");
        date = tokens.get(6).copied().unwrap_or("");
    }

    let composite = format!("{} {}", date, time);
    if let Ok(dt) = NaiveDateTime::parse_from_str(&composite, "%d/%m/%Y %H:%M:%S") {
        return Some(RecordingStart::DateTime(dt));
    }
    log::debug!("'{}' is not a date and time, trying time only", composite);

    NaiveTime::parse_from_str(time, "%H:%M:%S")
        .ok()
        .map(RecordingStart::TimeOnly)
}

/// Parses the optional base time/date pair of a WFDB record line.
pub fn parse_wfdb_start(time: Option<&str>, date: Option<&str>) -> Option<RecordingStart> {
    let time = parse_wfdb_time(time?)?;
    match date.and_then(|d| NaiveDate::parse_from_str(d, "%d/%m/%Y").ok()) {
        Some(date) => Some(RecordingStart::DateTime(date.and_time(time))),
        None => Some(RecordingStart::TimeOnly(time)),
    }
}

/// WFDB base times may omit the hour or carry fractional seconds.
fn parse_wfdb_time(s: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    let (h, m, sec) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return None,
    };
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    let seconds: f64 = sec.parse().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = seconds.trunc() as u32;
    let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
    NaiveTime::from_hms_nano_opt(hour, minute, whole, nanos.min(999_999_999))
}

/// Converts `h:m:s`, `m:s` or plain seconds to seconds. Returns `None` for
/// anything that is not a colon-separated list of non-negative numbers.
pub fn hms_to_seconds(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total = 0u64;
    for (i, part) in s.split(':').enumerate() {
        if i > 2 {
            return None;
        }
        let value: u64 = part.trim().parse().ok()?;
        total = total * 60 + value;
    }
    Some(total)
}

/// Formats a sample position as `HH:MM:SS`.
pub fn format_position(position: i64, sample_rate: u32) -> String {
    let rate = sample_rate.max(1) as i64;
    let secs = position.max(0) / rate;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_atoi_nonlocalized() {
        assert_eq!(atoi_nonlocalized("123"), 123);
        assert_eq!(atoi_nonlocalized(" -45 "), -45);
        assert_eq!(atoi_nonlocalized("250/1000"), 0);
        assert_eq!(atoi_nonlocalized(""), 0);
    }

    #[test]
    fn test_round_to_int() {
        assert_eq!(round_to_int(2.5), 3);
        assert_eq!(round_to_int(-2.5), -3);
        assert_eq!(round_to_int(2.49), 2);
    }

    #[test]
    fn test_legacy_start_time_first() {
        let tokens = simplified_tokens("rec 3 256 0 10:15:30 2/3/2018");
        let start = parse_legacy_start(&tokens).unwrap();
        let expected = NaiveDate::from_ymd_opt(2018, 3, 2)
            .unwrap()
            .and_hms_opt(10, 15, 30)
            .unwrap();
        assert_eq!(start, RecordingStart::DateTime(expected));
    }

    #[test]
    fn test_legacy_start_shifted() {
        let tokens = simplified_tokens("rec  3   256 0 x 8:05:09   25/12/2019");
        let start = parse_legacy_start(&tokens).unwrap();
        assert_eq!(start.time().hour(), 8);
        assert!(matches!(start, RecordingStart::DateTime(_)));
    }

    #[test]
    fn test_legacy_start_time_only() {
        let tokens = simplified_tokens("rec 1 200 0 23:59:01 not-a-date");
        let start = parse_legacy_start(&tokens).unwrap();
        assert_eq!(start, RecordingStart::TimeOnly(NaiveTime::from_hms_opt(23, 59, 1).unwrap()));

        let tokens = simplified_tokens("rec 1 200");
        assert!(parse_legacy_start(&tokens).is_none());
    }

    #[test]
    fn test_wfdb_start() {
        let start = parse_wfdb_start(Some("12:00:01.5"), Some("01/02/2003")).unwrap();
        assert_eq!(start.time().nanosecond(), 500_000_000);
        assert!(matches!(start, RecordingStart::DateTime(_)));
        assert!(matches!(parse_wfdb_start(Some("5:10"), None), Some(RecordingStart::TimeOnly(_))));
        assert!(parse_wfdb_start(None, Some("01/02/2003")).is_none());
    }

    #[test]
    fn test_hms_to_seconds() {
        assert_eq!(hms_to_seconds("1:02:03"), Some(3723));
        assert_eq!(hms_to_seconds("2:30"), Some(150));
        assert_eq!(hms_to_seconds("42"), Some(42));
        assert_eq!(hms_to_seconds("1:2:3:4"), None);
        assert_eq!(hms_to_seconds("a:b"), None);
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(200 * 3723, 200), "01:02:03");
        assert_eq!(format_position(-5, 200), "00:00:00");
    }
}

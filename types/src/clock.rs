//! Clock-string parsing and formatting.
//!
//! Sequence definitions express timeline offsets as human-readable clock
//! strings. Two shapes are accepted:
//! - `m:ss` / `mm:ss` (whole seconds)
//! - `m:ss.f` / `mm:ss.f` (fractional seconds, up to millisecond precision)

use std::time::Duration;

/// Maximum number of fractional digits honoured (milliseconds).
const MAX_FRACTION_DIGITS: usize = 3;

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a clock string into an offset from the start of the timeline.
///
/// Returns `None` for anything that is not `m:ss` or `m:ss.f` (minutes may be
/// one or two digits, seconds exactly two digits below 60).
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use hapsync_types::clock::parse_clock;
/// assert_eq!(parse_clock("0:16"), Some(Duration::from_secs(16)));
/// assert_eq!(parse_clock("1:12.5"), Some(Duration::from_millis(72_500)));
/// assert_eq!(parse_clock("12:03"), Some(Duration::from_secs(723)));
/// assert_eq!(parse_clock("1:75"), None);
/// assert_eq!(parse_clock("soon"), None);
/// ```
pub fn parse_clock(s: &str) -> Option<Duration> {
    let (minutes, rest) = s.trim().split_once(':')?;
    if minutes.len() > 2 || !all_digits(minutes) {
        return None;
    }

    let (seconds, fraction) = match rest.split_once('.') {
        Some((secs, frac)) => (secs, Some(frac)),
        None => (rest, None),
    };
    if seconds.len() != 2 || !all_digits(seconds) {
        return None;
    }

    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if seconds >= 60 {
        return None;
    }

    let millis = match fraction {
        Some(frac) => {
            if frac.len() > MAX_FRACTION_DIGITS || !all_digits(frac) {
                return None;
            }
            // Right-pad to milliseconds: "5" -> 500, "25" -> 250
            let padded = format!("{:0<width$}", frac, width = MAX_FRACTION_DIGITS);
            padded.parse::<u64>().ok()?
        }
        None => 0,
    };

    Some(Duration::from_millis((minutes * 60 + seconds) * 1000 + millis))
}

/// Format an offset as a clock string.
///
/// Whole seconds render as `m:ss`; anything with a non-zero tenth renders as
/// `m:ss.f` (rounded to the nearest tenth).
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use hapsync_types::clock::format_clock;
/// assert_eq!(format_clock(Duration::from_secs(0)), "0:00");
/// assert_eq!(format_clock(Duration::from_secs(125)), "2:05");
/// assert_eq!(format_clock(Duration::from_millis(72_500)), "1:12.5");
/// ```
pub fn format_clock(d: Duration) -> String {
    let tenths = (d.as_millis() + 50) / 100;
    let total_secs = tenths / 10;
    let frac = tenths % 10;
    let (m, s) = (total_secs / 60, total_secs % 60);
    if frac == 0 {
        format!("{}:{:02}", m, s)
    } else {
        format!("{}:{:02}.{}", m, s, frac)
    }
}

/// Format a position in seconds (as reported by playback collaborators).
pub fn format_clock_secs(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return format_clock(Duration::ZERO);
    }
    format_clock(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whole_seconds() {
        assert_eq!(parse_clock("0:00"), Some(Duration::ZERO));
        assert_eq!(parse_clock("0:28"), Some(Duration::from_secs(28)));
        assert_eq!(parse_clock("1:54"), Some(Duration::from_secs(114)));
        assert_eq!(parse_clock("01:05"), Some(Duration::from_secs(65)));
        assert_eq!(parse_clock(" 0:30 "), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_fractional_seconds() {
        assert_eq!(parse_clock("0:30.5"), Some(Duration::from_millis(30_500)));
        assert_eq!(parse_clock("0:01.25"), Some(Duration::from_millis(1_250)));
        assert_eq!(parse_clock("0:01.125"), Some(Duration::from_millis(1_125)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_clock(""), None);
        assert_eq!(parse_clock("30"), None);
        assert_eq!(parse_clock("0:5"), None);
        assert_eq!(parse_clock("0:60"), None);
        assert_eq!(parse_clock("123:00"), None);
        assert_eq!(parse_clock("0:30."), None);
        assert_eq!(parse_clock("0:30.1234"), None);
        assert_eq!(parse_clock("a:bc"), None);
        assert_eq!(parse_clock("-1:00"), None);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::ZERO), "0:00");
        assert_eq!(format_clock(Duration::from_secs(59)), "0:59");
        assert_eq!(format_clock(Duration::from_secs(60)), "1:00");
        assert_eq!(format_clock(Duration::from_millis(30_500)), "0:30.5");
        assert_eq!(format_clock(Duration::from_millis(59_960)), "1:00");
    }

    #[test]
    fn test_format_clock_secs() {
        assert_eq!(format_clock_secs(125.0), "2:05");
        assert_eq!(format_clock_secs(-3.0), "0:00");
        assert_eq!(format_clock_secs(f64::NAN), "0:00");
        assert!(format_clock_secs(1e300).contains(':'));
    }
}

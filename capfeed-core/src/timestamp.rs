//! Capture timestamps embedded in image filenames (`dd-mm-yyyy_HH-MM-SS.jpg`).
//!
//! The backend offers no structured metadata, so the capture instant is read
//! from the tail of the reference. Everything that depends on that lexical
//! contract goes through this module.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

/// Display and grouping label for references without a parsable stamp.
pub const UNKNOWN: &str = "Unknown";

/// Zone the device writes its stamps in. Only used as a display label.
pub const CAPTURE_ZONE: &str = "UTC";

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{2})-(\d{2})-(\d{4})_(\d{2})-(\d{2})-(\d{2})\.(?i:jpe?g)$")
            .expect("timestamp pattern compiles")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CaptureStamp(NaiveDateTime);

impl CaptureStamp {
    /// Extract the capture instant from an image reference.
    ///
    /// Fields that match the pattern but do not form a real date or time
    /// (e.g. `31-02-2025`) are treated like a non-match.
    pub fn parse(image: &str) -> Option<Self> {
        let caps = pattern().captures(image)?;
        let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let (day, month, year) = (field(1)?, field(2)?, field(3)?);
        let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);
        let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
        let at = date.and_hms_opt(hour, minute, second)?;
        Some(CaptureStamp(at))
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// Grouping key in `yyyy-mm-dd` form.
    pub fn date_key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn time_label(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    pub fn display(&self) -> String {
        format!("{} {}", self.0.format("%Y-%m-%d %H:%M:%S"), CAPTURE_ZONE)
    }
}

/// Key of a date group. `Unknown` orders below every real date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Unknown,
    Date(NaiveDate),
}

impl GroupKey {
    pub fn is_unknown(&self) -> bool {
        matches!(self, GroupKey::Unknown)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Unknown => f.write_str(UNKNOWN),
            GroupKey::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn group_key(image: &str) -> GroupKey {
    CaptureStamp::parse(image)
        .map(|s| GroupKey::Date(s.date()))
        .unwrap_or(GroupKey::Unknown)
}

/// Human readable capture time, or [`UNKNOWN`].
pub fn display_stamp(image: &str) -> String {
    CaptureStamp::parse(image)
        .map(|s| s.display())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_from_tail_of_path() {
        let s = CaptureStamp::parse("/static/2025/08/14/14-08-2025_15-29-30.jpg").unwrap();
        assert_eq!(s.date_key(), "2025-08-14");
        assert_eq!(s.time_label(), "15:29:30");
        assert_eq!(s.display(), "2025-08-14 15:29:30 UTC");
    }

    #[test]
    fn accepts_jpeg_extension_in_any_case() {
        assert!(CaptureStamp::parse("01-01-2024_00-00-00.JPG").is_some());
        assert!(CaptureStamp::parse("01-01-2024_00-00-00.jpeg").is_some());
        assert!(CaptureStamp::parse("01-01-2024_00-00-00.JpEg").is_some());
        assert!(CaptureStamp::parse("01-01-2024_00-00-00.png").is_none());
    }

    #[test]
    fn pattern_must_end_the_reference() {
        assert!(CaptureStamp::parse("01-01-2024_00-00-00.jpg.bak").is_none());
        assert!(CaptureStamp::parse("snapshot.jpg").is_none());
    }

    #[test]
    fn impossible_dates_are_unknown() {
        assert!(CaptureStamp::parse("31-02-2025_10-00-00.jpg").is_none());
        assert!(CaptureStamp::parse("01-01-2025_25-00-00.jpg").is_none());
        assert_eq!(group_key("31-02-2025_10-00-00.jpg"), GroupKey::Unknown);
    }

    #[test]
    fn unknown_sentinel_for_display_and_key() {
        assert_eq!(display_stamp("/static/cat.jpg"), UNKNOWN);
        assert_eq!(group_key("/static/cat.jpg").to_string(), UNKNOWN);
    }

    #[test]
    fn unknown_sorts_below_dates() {
        let d = group_key("12-08-2025_10-00-00.jpg");
        assert!(GroupKey::Unknown < d);
        assert!(group_key("13-08-2025_00-00-00.jpg") > d);
    }
}

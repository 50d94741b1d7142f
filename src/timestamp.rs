//! Timestamps and the monthly budget window

use chrono::{DateTime, Datelike, TimeZone, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// DateTime compares for any zone; a derive would demand the bounds of T
// itself, which Utc does not carry.
impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// Half-open calendar-month window `[start, end)` containing `at`.
/// Monthly spend aggregation counts requests whose request date falls inside.
pub fn month_window(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
        .unwrap();
    let (next_year, next_month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).unwrap();
    (start, end)
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = TimeStamp::new_with(2025, 3, 1, 0, 0, 0);
        let later = TimeStamp::new_with(2025, 3, 2, 0, 0, 0);

        assert!(earlier < later);
        assert_eq!(earlier.cmp(&later), std::cmp::Ordering::Less);

        let mut stamps = vec![later.clone(), earlier.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![earlier, later]);
    }

    #[test]
    fn month_window_contains_date() {
        let at = TimeStamp::new_with(2025, 6, 15, 10, 30, 0).to_datetime_utc();
        let (start, end) = month_window(at);

        assert_eq!(start, TimeStamp::new_with(2025, 6, 1, 0, 0, 0).to_datetime_utc());
        assert_eq!(end, TimeStamp::new_with(2025, 7, 1, 0, 0, 0).to_datetime_utc());
        assert!(start <= at && at < end);
    }

    #[test]
    fn month_window_wraps_december() {
        let at = TimeStamp::new_with(2025, 12, 31, 23, 59, 59).to_datetime_utc();
        let (start, end) = month_window(at);

        assert_eq!(start, TimeStamp::new_with(2025, 12, 1, 0, 0, 0).to_datetime_utc());
        assert_eq!(end, TimeStamp::new_with(2026, 1, 1, 0, 0, 0).to_datetime_utc());
    }
}

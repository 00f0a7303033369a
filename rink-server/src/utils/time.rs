//! 时间工具函数 — 业务时区转换
//!
//! 所有业务时间戳都锚定在配置的 civil 时区 (默认 Asia/Kathmandu)，
//! 与服务器本地时区无关。repository 层只接收 `i64` Unix millis。

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use super::{AppError, AppResult};

/// Swappable time source, so the factory and sweeper are deterministic
/// under test.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> i64 {
        self.now_utc().timestamp_millis()
    }
}

/// Production clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for deterministic tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_millis(millis: i64) -> Self {
        Self(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Secondary-calendar conversion (opaque collaborator).
///
/// Maps a civil-zone calendar day to the secondary calendar's date string
/// printed on tickets. The conversion algorithm itself is not this core's
/// concern; the default implementation renders ISO `YYYY-MM-DD`.
pub trait CalendarConverter: Send + Sync {
    fn calendar_date(&self, date: NaiveDate) -> String;
}

/// Default converter: ISO rendering of the civil-zone day
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoCalendar;

impl CalendarConverter for IsoCalendar {
    fn calendar_date(&self, date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Creation-instant rendering: one instant, three representations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedStamp {
    /// Unix millis (zone-independent)
    pub created_at: i64,
    /// Creation day in the secondary calendar
    pub calendar_date: String,
    /// HH:mm:ss wall clock in the civil zone
    pub entry_time: String,
}

/// Render a creation instant in the civil zone.
///
/// Pure: the same instant, zone, and converter always produce the same
/// stamp regardless of the server's local time zone.
pub fn creation_stamp(
    instant: DateTime<Utc>,
    tz: Tz,
    calendar: &dyn CalendarConverter,
) -> CreatedStamp {
    let local = instant.with_timezone(&tz);
    CreatedStamp {
        created_at: instant.timestamp_millis(),
        calendar_date: calendar.calendar_date(local.date_naive()),
        entry_time: local.format("%H:%M:%S").to_string(),
    }
}

/// 解析日期字符串 (YYYY-MM-DD)
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("Invalid date format: {}", date)))
}

/// 日期 + 时分秒 → Unix millis (业务时区)
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
fn date_hms_to_millis(date: NaiveDate, hour: u32, min: u32, sec: u32, tz: Tz) -> i64 {
    let naive = date.and_hms_opt(hour, min, sec).unwrap_or_default();
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 日期开始 (00:00:00) → Unix millis (业务时区)
pub fn day_start_millis(date: NaiveDate, tz: Tz) -> i64 {
    date_hms_to_millis(date, 0, 0, 0, tz)
}

/// 日期结束 → 次日 00:00:00 的 Unix millis (业务时区)
///
/// 返回次日零点时间戳，调用方使用 `< end` (不含) 语义。
pub fn day_end_millis(date: NaiveDate, tz: Tz) -> i64 {
    let next_day = date.succ_opt().unwrap_or(date);
    date_hms_to_millis(next_day, 0, 0, 0, tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Kathmandu;

    #[test]
    fn creation_stamp_is_deterministic_and_zone_anchored() {
        // 2024-03-10 18:15:00 UTC == 2024-03-11 00:00:00 +05:45
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 18, 15, 0).unwrap();
        let a = creation_stamp(instant, Kathmandu, &IsoCalendar);
        let b = creation_stamp(instant, Kathmandu, &IsoCalendar);
        assert_eq!(a, b);
        assert_eq!(a.calendar_date, "2024-03-11");
        assert_eq!(a.entry_time, "00:00:00");
        assert_eq!(a.created_at, instant.timestamp_millis());
    }

    #[test]
    fn day_bounds_are_half_open() {
        let date = parse_date("2024-03-11").unwrap();
        let start = day_start_millis(date, Kathmandu);
        let end = day_end_millis(date, Kathmandu);
        assert_eq!(end - start, 24 * 60 * 60 * 1000);
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_date("11-03-2024").is_err());
        assert!(parse_date("not-a-date").is_err());
    }
}

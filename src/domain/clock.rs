// ==========================================
// 口试时段排程系统 - 墙钟时间工具
// ==========================================
// 约定: 所有时间均为组织所在时区的本地墙钟时间, 不做时区换算
// 存储格式: 日期 YYYY-MM-DD, 时间 HH:MM
// ==========================================

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// 解析 "HH:MM"（兼容 "HH:MM:SS"）
pub fn parse_time(value: &str) -> Result<NaiveTime, chrono::ParseError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
}

/// 解析 "YYYY-MM-DD"
pub fn parse_date(value: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// 在同一天内加分钟数
///
/// 跨过午夜返回 None（NaiveTime 自身的加法会回绕）
pub fn add_minutes(time: NaiveTime, minutes: i64) -> Option<NaiveTime> {
    let (result, overflow_secs) = time.overflowing_add_signed(Duration::minutes(minutes));
    if overflow_secs == 0 {
        Some(result)
    } else {
        None
    }
}

/// 两个时刻之间的分钟数 (end - start)
pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> i64 {
    (end - start).num_minutes()
}

// ==========================================
// TimeRange - 半开区间 [start, end)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// 区间是否与另一区间相交（均为半开区间）
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

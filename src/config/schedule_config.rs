// ==========================================
// 口试时段排程系统 - 排程配置值对象
// ==========================================
// 红线: 不可变配置, 每次入口调用加载一次后显式传入各组件
// ==========================================

use chrono::{Local, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置项格式错误 (key={key}, value={value}): {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },

    #[error("配置读取失败: {0}")]
    ReadError(String),
}

// ==========================================
// ScheduleConfig - 排程配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub exam_day: Weekday,                      // 考试星期
    pub exam_start_time: NaiveTime,             // 默认时间窗开始
    pub exam_end_time: NaiveTime,               // 默认时间窗结束
    pub exam_duration_minutes: i64,             // 单场时长
    pub exam_buffer_minutes: i64,               // 场间缓冲
    pub quarter_start_date: NaiveDate,          // 学期开始日期
    pub total_exams: u32,                       // 考试轮次数 N
    pub balanced_ta_scheduling: bool,           // 跨分组均衡分配
    pub exam_dates: BTreeMap<String, String>,   // 日期覆写 "{exam}_{parity}" -> "YYYY-MM-DD"
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            exam_day: Weekday::Fri,
            exam_start_time: NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN),
            exam_end_time: NaiveTime::from_hms_opt(14, 50, 0).unwrap_or(NaiveTime::MIN),
            exam_duration_minutes: 7,
            exam_buffer_minutes: 1,
            quarter_start_date: Local::now().date_naive(),
            total_exams: 5,
            balanced_ta_scheduling: false,
            exam_dates: BTreeMap::new(),
        }
    }
}

impl ScheduleConfig {
    /// 单场时长 + 缓冲 (相邻两场开始时间的间隔)
    pub fn cadence_minutes(&self) -> i64 {
        self.exam_duration_minutes + self.exam_buffer_minutes
    }

    /// 受影响的考试轮次 start..=total_exams
    pub fn exam_indices_from(&self, start_exam_index: u32) -> std::ops::RangeInclusive<u32> {
        start_exam_index.max(1)..=self.total_exams
    }
}

/// 解析星期名称 (大小写不敏感, 支持全称与缩写)
pub fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "sunday" | "sun" => Some(Weekday::Sun),
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        _ => None,
    }
}
